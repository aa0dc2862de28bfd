use std::path::PathBuf;

pub(crate) type Revision = u32;

/// A revision range as passed to a range merge, applied as `-r start:end`
/// (`start` exclusive, `end` inclusive, SVN convention).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct RevisionRange {
    pub(crate) start: Revision,
    pub(crate) end: Revision,
}

impl RevisionRange {
    pub(crate) fn new(start: Revision, end: Revision) -> Self {
        Self { start, end }
    }

    /// Swaps the endpoints, turning a forward merge range into an undo-style
    /// (reverse) one.
    pub(crate) fn inverted(self) -> Self {
        Self {
            start: self.end,
            end: self.start,
        }
    }
}

impl std::fmt::Display for RevisionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Returns whether `child` equals `parent` or lies strictly under it.
/// Trailing slashes are ignored on both sides.
pub(crate) fn is_url_ancestor(parent: &str, child: &str) -> bool {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_end_matches('/');
    match child.strip_prefix(parent) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// The path of `child` relative to `parent` (no leading slash), or `None`
/// if `child` is not under `parent`.
pub(crate) fn url_relative<'a>(parent: &str, child: &'a str) -> Option<&'a str> {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_end_matches('/');
    match child.strip_prefix(parent) {
        Some("") => Some(""),
        Some(rest) if rest.starts_with('/') => Some(&rest[1..]),
        _ => None,
    }
}

pub(crate) fn append_url(base: &str, rel: &str) -> String {
    let base = base.trim_end_matches('/');
    let rel = rel.trim_start_matches('/');
    if rel.is_empty() {
        base.to_owned()
    } else {
        format!("{base}/{rel}")
    }
}

/// The last path component of a branch URL, used as the human-readable
/// branch name in comments and reports.
pub(crate) fn branch_name_of(url: &str) -> &str {
    let url = url.trim_end_matches('/');
    url.rsplit('/').next().unwrap_or(url)
}

/// One changed path inside a committed revision. `before`/`after` are the
/// pristine revisions on either side of the change; an addition has no
/// `before`, a deletion has no `after`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PathChange {
    /// Repository-relative path, with a leading slash.
    pub(crate) path: String,
    pub(crate) before: Option<Revision>,
    pub(crate) after: Option<Revision>,
}

/// A committed changelist of the source branch history.
#[derive(Clone, Debug)]
pub(crate) struct Changelist {
    pub(crate) revision: Revision,
    pub(crate) author: String,
    pub(crate) date: chrono::DateTime<chrono::Utc>,
    pub(crate) message: String,
    pub(crate) changes: Vec<PathChange>,
}

/// Immutable per-operation facts. Owned by exactly one merge run.
#[derive(Clone, Debug)]
pub(crate) struct MergeContext {
    pub(crate) repository_root: String,
    pub(crate) source_url: String,
    pub(crate) target_url: String,
    pub(crate) branch_name: String,
    pub(crate) working_copy: PathBuf,
}

impl MergeContext {
    /// Source branch path relative to the repository root, with a leading
    /// slash (the form used by `svn:mergeinfo` and log output).
    pub(crate) fn source_path(&self) -> String {
        match url_relative(&self.repository_root, &self.source_url) {
            Some(rel) => format!("/{rel}"),
            None => self.source_url.clone(),
        }
    }

    /// Maps a repository-relative path of the source branch to the working
    /// copy path it would land on, or `None` for paths outside the branch.
    pub(crate) fn wc_path_for(&self, repo_path: &str) -> Option<PathBuf> {
        let source_path = self.source_path();
        let rel = url_relative(&source_path, repo_path)?;
        if rel.is_empty() {
            Some(self.working_copy.clone())
        } else {
            Some(self.working_copy.join(rel))
        }
    }

    /// Full URL of a repository-relative path.
    pub(crate) fn url_for(&self, repo_path: &str) -> String {
        append_url(&self.repository_root, repo_path)
    }
}

#[cfg(test)]
mod tests {
    use super::{MergeContext, append_url, branch_name_of, is_url_ancestor, url_relative};

    #[test]
    fn test_url_ancestor() {
        assert!(is_url_ancestor("http://r/branches/x", "http://r/branches/x"));
        assert!(is_url_ancestor("http://r/branches/x", "http://r/branches/x/"));
        assert!(is_url_ancestor(
            "http://r/branches/x",
            "http://r/branches/x/sub/dir",
        ));
        assert!(!is_url_ancestor(
            "http://r/branches/x",
            "http://r/branches/x2",
        ));
        assert!(!is_url_ancestor(
            "http://r/branches/x/sub",
            "http://r/branches/x",
        ));
    }

    #[test]
    fn test_url_relative() {
        assert_eq!(url_relative("http://r", "http://r/trunk/a"), Some("trunk/a"));
        assert_eq!(url_relative("http://r/trunk", "http://r/trunk"), Some(""));
        assert_eq!(url_relative("http://r/trunk", "http://r/tags"), None);
    }

    #[test]
    fn test_append_url() {
        assert_eq!(append_url("http://r/", "/trunk"), "http://r/trunk");
        assert_eq!(append_url("http://r", ""), "http://r");
    }

    #[test]
    fn test_branch_name() {
        assert_eq!(branch_name_of("http://r/branches/feature-1/"), "feature-1");
    }

    #[test]
    fn test_wc_path_for() {
        let ctx = MergeContext {
            repository_root: "http://r".into(),
            source_url: "http://r/branches/x".into(),
            target_url: "http://r/trunk".into(),
            branch_name: "x".into(),
            working_copy: "/wc".into(),
        };
        assert_eq!(ctx.source_path(), "/branches/x");
        assert_eq!(
            ctx.wc_path_for("/branches/x/dir/file"),
            Some(std::path::PathBuf::from("/wc/dir/file")),
        );
        assert_eq!(ctx.wc_path_for("/branches/other/file"), None);
    }
}
