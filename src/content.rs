//! Binary detection and MIME mapping.
//!
//! Binary detection is heuristic: a fixed set of magic-byte prefixes for
//! common container formats, then a NUL scan over the first 8 KiB. MIME
//! lookup consults an overlay table for formats the standard tables get
//! wrong or miss (Markdown, frontend component files), then falls back to
//! `mime_guess`, then to `text/plain`.

/// Magic-byte prefixes of formats that are always binary.
const BINARY_MAGIC: &[&[u8]] = &[
    b"\x89PNG",         // PNG
    b"\xff\xd8\xff",    // JPEG
    b"GIF8",            // GIF
    b"PK\x03\x04",      // ZIP and office containers
    b"%PDF",            // PDF
    b"\x7fELF",         // ELF
    b"MZ",              // Windows executable
];

/// How far into the content the NUL scan looks.
const NUL_SCAN_LEN: usize = 8192;

/// Fallback for unknown or empty paths.
pub const DEFAULT_MIME: &str = "text/plain";

/// Whether content looks binary: a known magic prefix, or a NUL byte within
/// the first 8 KiB.
pub fn is_binary(content: &[u8]) -> bool {
    if BINARY_MAGIC
        .iter()
        .any(|magic| content.starts_with(magic))
    {
        return true;
    }
    let sample = &content[..content.len().min(NUL_SCAN_LEN)];
    sample.contains(&0u8)
}

fn overlay_mime(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "md" | "markdown" => "text/markdown",
        "rst" => "text/x-rst",
        "yaml" | "yml" => "text/yaml",
        "toml" => "text/toml",
        "json" => "application/json",
        "jsonl" => "application/x-ndjson",
        "tsx" => "text/typescript-jsx",
        "jsx" => "text/javascript-jsx",
        "vue" => "text/x-vue",
        "svelte" => "text/x-svelte",
        "astro" => "text/x-astro",
        "mdx" => "text/mdx",
        _ => return None,
    })
}

/// MIME type for a path, by extension only.
pub fn mime_for(path: &str) -> String {
    if path.is_empty() {
        return DEFAULT_MIME.to_string();
    }

    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase());

    if let Some(ext) = &ext {
        if let Some(mime) = overlay_mime(ext) {
            return mime.to_string();
        }
    }

    mime_guess::from_path(path)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| DEFAULT_MIME.to_string())
}
