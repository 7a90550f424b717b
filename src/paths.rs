//! Path normalization and filter utilities.
//!
//! Paths coming out of the commit graph are repository-relative. Before a
//! path participates in identity (`source_url`) or is emitted, it is
//! normalized to POSIX form; a `..` component anywhere is a traversal
//! attempt and is rejected. Filenames that merely contain consecutive dots
//! (`notes..md`) are fine.

use crate::error::SyncError;

/// Parse a comma-separated extension list into lowercase, dot-prefixed
/// entries, preserving first-seen order.
///
/// `" md, .TXT ,,rst "` → `[".md", ".txt", ".rst"]`. Empty or whitespace
/// input yields an empty list.
pub fn parse_extensions(extensions: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in extensions.split(',') {
        let ext = raw.trim().to_lowercase();
        if ext.is_empty() {
            continue;
        }
        let ext = if ext.starts_with('.') {
            ext
        } else {
            format!(".{ext}")
        };
        if !out.contains(&ext) {
            out.push(ext);
        }
    }
    out
}

/// Normalize a repository path to POSIX form.
///
/// Backslashes become `/`, the leading `/` is stripped, leading `./`
/// segments are stripped repeatedly, and any exact `..` component fails
/// with [`SyncError::Path`].
pub fn normalize_path(path: &str) -> Result<String, SyncError> {
    let mut p = path.replace('\\', "/");

    p = p.trim_start_matches('/').to_string();
    while let Some(rest) = p.strip_prefix("./") {
        p = rest.to_string();
    }

    if p.split('/').any(|component| component == "..") {
        return Err(SyncError::Path {
            path: path.to_string(),
            reason: "path traversal".to_string(),
        });
    }

    Ok(p)
}

/// Normalize a subdir filter: trimmed, no surrounding slashes.
pub fn normalize_subdir(subdir: &str) -> String {
    subdir.trim().trim_matches('/').to_string()
}

/// Whether `path` lies under `subdir`. An empty `subdir` matches everything.
pub fn matches_subdir(path: &str, subdir: &str) -> bool {
    let subdir = normalize_subdir(subdir);
    if subdir.is_empty() {
        return true;
    }
    let prefix = format!("{subdir}/");
    path.trim_start_matches('/').starts_with(&prefix)
}

/// Whether `path` ends with one of `extensions` (case-insensitive). An
/// empty extension list matches everything.
pub fn matches_extension(path: &str, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let lower = path.to_lowercase();
    extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
}

/// Keep only paths under `subdir`. Identity when `subdir` is empty.
pub fn filter_by_subdir(paths: Vec<String>, subdir: &str) -> Vec<String> {
    if normalize_subdir(subdir).is_empty() {
        return paths;
    }
    paths
        .into_iter()
        .filter(|p| matches_subdir(p, subdir))
        .collect()
}

/// Keep only paths matching one of `extensions`. Identity when empty.
pub fn filter_by_extensions(paths: Vec<String>, extensions: &[String]) -> Vec<String> {
    if extensions.is_empty() {
        return paths;
    }
    paths
        .into_iter()
        .filter(|p| matches_extension(p, extensions))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_extensions_normalizes() {
        assert_eq!(
            parse_extensions(" md, .TXT ,,rst "),
            strings(&[".md", ".txt", ".rst"])
        );
        assert_eq!(parse_extensions(""), Vec::<String>::new());
        assert_eq!(parse_extensions("  ,  , "), Vec::<String>::new());
    }

    #[test]
    fn parse_extensions_keeps_insertion_order_and_dedupes() {
        assert_eq!(
            parse_extensions(".txt,.md,.TXT,md"),
            strings(&[".txt", ".md"])
        );
    }

    #[test]
    fn normalize_strips_prefixes() {
        assert_eq!(normalize_path("docs/a.md").unwrap(), "docs/a.md");
        assert_eq!(normalize_path("/docs/a.md").unwrap(), "docs/a.md");
        assert_eq!(normalize_path("./docs/a.md").unwrap(), "docs/a.md");
        assert_eq!(normalize_path("/././docs/a.md").unwrap(), "docs/a.md");
        assert_eq!(normalize_path("docs\\win\\a.md").unwrap(), "docs/win/a.md");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["docs/a.md", "/x/./y.md", ".\\z\\notes..md"] {
            let once = normalize_path(input).unwrap();
            assert_eq!(normalize_path(&once).unwrap(), once);
        }
    }

    #[test]
    fn normalize_rejects_traversal_components() {
        assert!(normalize_path("../etc/passwd").is_err());
        assert!(normalize_path("docs/../secret.md").is_err());
        assert!(normalize_path("docs/..").is_err());
        assert!(normalize_path("..\\win").is_err());
    }

    #[test]
    fn normalize_allows_dotted_filenames() {
        assert_eq!(normalize_path("notes..md").unwrap(), "notes..md");
        assert_eq!(normalize_path("test...py").unwrap(), "test...py");
        assert_eq!(normalize_path("docs/a..b.md").unwrap(), "docs/a..b.md");
    }

    #[test]
    fn subdir_filter() {
        let paths = strings(&["docs/a.md", "docs/sub/b.md", "src/main.py", "docsx/c.md"]);
        assert_eq!(
            filter_by_subdir(paths.clone(), "docs"),
            strings(&["docs/a.md", "docs/sub/b.md"])
        );
        assert_eq!(
            filter_by_subdir(paths.clone(), "/docs/"),
            strings(&["docs/a.md", "docs/sub/b.md"])
        );
        assert_eq!(filter_by_subdir(paths.clone(), ""), paths);
    }

    #[test]
    fn subdir_filter_does_not_match_prefix_siblings() {
        assert!(!matches_subdir("docsx/c.md", "docs"));
        assert!(matches_subdir("/docs/c.md", "docs"));
    }

    #[test]
    fn extension_filter() {
        let paths = strings(&["a.md", "b.MD", "c.txt", "d.py"]);
        let exts = parse_extensions(".md");
        assert_eq!(
            filter_by_extensions(paths.clone(), &exts),
            strings(&["a.md", "b.MD"])
        );
        assert_eq!(filter_by_extensions(paths.clone(), &[]), paths);
    }
}
