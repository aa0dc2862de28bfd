use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::client::ClientError;

/// A group of uncommitted local edits (an SVN changelist, or the ungrouped
/// default set).
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct LocalChangeGroup {
    pub(crate) name: String,
    pub(crate) files: Vec<PathBuf>,
}

pub(crate) const DEFAULT_GROUP_NAME: &str = "default";

/// Mutating/querying access to the working copy outside of merge calls.
pub(crate) trait WorkingCopyState: Send + Sync {
    /// Nested working-copy roots under `root` switched to another branch.
    fn switched_roots(&self, root: &Path) -> Result<Vec<PathBuf>, ClientError>;

    /// Currently pending (uncommitted) local edits, grouped.
    fn pending_changes(&self, root: &Path) -> Result<Vec<LocalChangeGroup>, ClientError>;

    /// Stashes the given files away under `stash_name`, reverting them in
    /// the working copy.
    fn shelve(&self, root: &Path, files: &[PathBuf], stash_name: &str)
    -> Result<(), ClientError>;

    /// Assigns files to a named change group.
    fn assign_change_group(&self, name: &str, files: &[PathBuf]) -> Result<(), ClientError>;
}

/// Locally modified files that overlap the paths the merge is about to
/// touch, keyed by their originating change group. Empty means uncommitted
/// edits pose no conflict risk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Intersection {
    groups: BTreeMap<String, Vec<PathBuf>>,
}

impl Intersection {
    pub(crate) fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub(crate) fn groups(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
        self.groups
            .iter()
            .map(|(name, files)| (name.as_str(), files.as_slice()))
    }

    pub(crate) fn all_files(&self) -> Vec<&Path> {
        self.groups
            .values()
            .flatten()
            .map(PathBuf::as_path)
            .collect()
    }
}

/// Computes the overlap between pending local edits and the working-copy
/// paths the merge will touch. `merge_all` merges the whole branch, so every
/// pending edit under the target intersects by definition.
pub(crate) fn intersect(
    pending: &[LocalChangeGroup],
    merge_paths: &[PathBuf],
    merge_all: bool,
) -> Intersection {
    let mut groups = BTreeMap::new();
    for group in pending {
        let overlapping: Vec<PathBuf> = group
            .files
            .iter()
            .filter(|file| {
                merge_all
                    || merge_paths.iter().any(|merge_path| {
                        file.starts_with(merge_path) || merge_path.starts_with(file)
                    })
            })
            .cloned()
            .collect();
        if !overlapping.is_empty() {
            groups.insert(group.name.clone(), overlapping);
        }
    }
    Intersection { groups }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{LocalChangeGroup, intersect};

    fn pending() -> Vec<LocalChangeGroup> {
        vec![
            LocalChangeGroup {
                name: "default".into(),
                files: vec![PathBuf::from("/wc/src/a.rs"), PathBuf::from("/wc/doc/b.md")],
            },
            LocalChangeGroup {
                name: "refactor".into(),
                files: vec![PathBuf::from("/wc/src/lib.rs")],
            },
        ]
    }

    #[test]
    fn test_no_overlap_is_empty() {
        let merge_paths = vec![PathBuf::from("/wc/other")];
        assert!(intersect(&pending(), &merge_paths, false).is_empty());
    }

    #[test]
    fn test_overlap_grouped_by_change_group() {
        let merge_paths = vec![PathBuf::from("/wc/src")];
        let overlap = intersect(&pending(), &merge_paths, false);
        let groups: Vec<_> = overlap.groups().collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "default");
        assert_eq!(groups[0].1, [PathBuf::from("/wc/src/a.rs")]);
        assert_eq!(groups[1].0, "refactor");
        assert_eq!(groups[1].1, [PathBuf::from("/wc/src/lib.rs")]);
    }

    #[test]
    fn test_merge_all_intersects_everything() {
        let overlap = intersect(&pending(), &[], true);
        assert_eq!(overlap.all_files().len(), 3);
    }
}
