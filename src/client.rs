use std::path::{Path, PathBuf};

use crate::FHashMap;
use crate::repo::{Revision, RevisionRange};

/// Error reported by the external merge client for a single call. Carried
/// around as data (recorded into the accumulated result) rather than
/// propagated, so that partial progress is preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ClientError(pub(crate) String);

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Depth {
    Empty,
    Infinity,
}

impl Depth {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Infinity => "infinity",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum MergeAction {
    Added,
    Modified,
    Deleted,
    Skipped,
}

/// Per-file outcome of a merge call. Ordered by severity: a later, more
/// severe outcome for the same file replaces an earlier milder one when
/// results are accumulated across batches.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FileOutcome {
    Merged(MergeAction),
    Conflicted,
    Failed,
}

impl FileOutcome {
    fn severity(self) -> u8 {
        match self {
            Self::Merged(_) => 0,
            Self::Conflicted => 1,
            Self::Failed => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct MergeEvent {
    pub(crate) path: PathBuf,
    pub(crate) outcome: FileOutcome,
}

/// Receives file-level progress from all three merge forms.
pub(crate) trait MergeEventHandler {
    fn on_event(&mut self, event: MergeEvent);
}

impl MergeEventHandler for MergeResult {
    fn on_event(&mut self, event: MergeEvent) {
        self.record(event.path, event.outcome);
    }
}

/// The version-control operations the merge engine needs. Implemented by the
/// `svn` process adapter in production and by mocks in tests.
pub(crate) trait MergeClient: Send + Sync {
    /// Whether the server/client pair maintains merge-tracking metadata.
    fn supports_mergeinfo(&self) -> Result<bool, ClientError>;

    /// Raw `svn:mergeinfo` property of a working-copy path, if any.
    fn mergeinfo(&self, target: &Path) -> Result<Option<String>, ClientError>;

    /// Metadata-aware whole-branch merge; the server decides between a
    /// forward sync and a reintegrate.
    fn merge_tracked(
        &self,
        source: &str,
        destination: &Path,
        dry_run: bool,
        handler: &mut dyn MergeEventHandler,
    ) -> Result<(), ClientError>;

    /// Revision-range merge of `source` into `destination`.
    #[allow(clippy::too_many_arguments)]
    fn merge_range(
        &self,
        source: &str,
        range: RevisionRange,
        destination: &Path,
        depth: Depth,
        dry_run: bool,
        record_only: bool,
        force: bool,
        handler: &mut dyn MergeEventHandler,
    ) -> Result<(), ClientError>;

    /// Two-source diff merge (`source1@rev1` to `source2@rev2`) applied to
    /// `destination`.
    #[allow(clippy::too_many_arguments)]
    fn merge_diff(
        &self,
        source1: &str,
        rev1: Revision,
        source2: &str,
        rev2: Revision,
        destination: &Path,
        depth: Depth,
        use_ancestry: bool,
        dry_run: bool,
        handler: &mut dyn MergeEventHandler,
    ) -> Result<(), ClientError>;

    /// Copies `source@revision` to a new working-copy path (file addition
    /// replay).
    fn copy_from(
        &self,
        source: &str,
        revision: Revision,
        destination: &Path,
    ) -> Result<(), ClientError>;

    /// Schedules a working-copy path for deletion.
    fn delete(&self, target: &Path) -> Result<(), ClientError>;
}

/// Accumulated outcome of one merge operation across all executed batches.
/// Accumulation is duplicate-aware: a file touched by several batches appears
/// once, tagged with the most severe outcome seen.
#[derive(Default)]
pub(crate) struct MergeResult {
    files: FHashMap<PathBuf, FileOutcome>,
    errors: Vec<ClientError>,
    skipped: Vec<Revision>,
}

impl MergeResult {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, path: PathBuf, outcome: FileOutcome) {
        match self.files.entry(path) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                if outcome.severity() > entry.get().severity() {
                    entry.insert(outcome);
                }
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(outcome);
            }
        }
    }

    pub(crate) fn record_error(&mut self, error: ClientError) {
        self.errors.push(error);
    }

    pub(crate) fn record_skipped(&mut self, revisions: impl IntoIterator<Item = Revision>) {
        self.skipped.extend(revisions);
    }

    pub(crate) fn absorb(&mut self, other: MergeResult) {
        for (path, outcome) in other.files {
            self.record(path, outcome);
        }
        self.errors.extend(other.errors);
        self.skipped.extend(other.skipped);
    }

    /// Marks a previously conflicted file as resolved (it stays in the
    /// result as a merged modification).
    pub(crate) fn mark_resolved(&mut self, path: &Path) {
        if let Some(outcome) = self.files.get_mut(path) {
            if *outcome == FileOutcome::Conflicted {
                *outcome = FileOutcome::Merged(MergeAction::Modified);
            }
        }
    }

    pub(crate) fn outcome_of(&self, path: &Path) -> Option<FileOutcome> {
        self.files.get(path).copied()
    }

    pub(crate) fn has_conflicts(&self) -> bool {
        self.files
            .values()
            .any(|outcome| *outcome == FileOutcome::Conflicted)
    }

    pub(crate) fn conflicted_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|(_, outcome)| **outcome == FileOutcome::Conflicted)
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub(crate) fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub(crate) fn errors(&self) -> &[ClientError] {
        &self.errors
    }

    pub(crate) fn skipped(&self) -> &[Revision] {
        &self.skipped
    }

    /// Paths that were actually changed (merged or conflicted, not skipped).
    pub(crate) fn changed_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|(_, outcome)| {
                !matches!(outcome, FileOutcome::Merged(MergeAction::Skipped))
            })
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub(crate) fn is_nothing_changed(&self) -> bool {
        self.changed_paths().is_empty() && self.errors.is_empty()
    }
}

/// Scriptable in-memory client shared by the merger and pipeline tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use super::{
        ClientError, Depth, FileOutcome, MergeAction, MergeClient, MergeEvent, MergeEventHandler,
    };
    use crate::FHashSet;
    use crate::repo::{Revision, RevisionRange};

    #[derive(Default)]
    pub(crate) struct RecordingClient {
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) mergeinfo_supported: bool,
        pub(crate) mergeinfo_property: Option<String>,
        /// Range merges ending at these revisions report a conflicted file.
        pub(crate) conflict_on: FHashSet<Revision>,
        /// Range merges ending at these revisions fail outright.
        pub(crate) fail_on: FHashSet<Revision>,
    }

    impl RecordingClient {
        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record_call(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl MergeClient for RecordingClient {
        fn supports_mergeinfo(&self) -> Result<bool, ClientError> {
            Ok(self.mergeinfo_supported)
        }

        fn mergeinfo(&self, _target: &Path) -> Result<Option<String>, ClientError> {
            Ok(self.mergeinfo_property.clone())
        }

        fn merge_tracked(
            &self,
            source: &str,
            destination: &Path,
            dry_run: bool,
            handler: &mut dyn MergeEventHandler,
        ) -> Result<(), ClientError> {
            self.record_call(format!("tracked {source} dry_run={dry_run}"));
            handler.on_event(MergeEvent {
                path: destination.join("tracked.txt"),
                outcome: FileOutcome::Merged(MergeAction::Modified),
            });
            Ok(())
        }

        fn merge_range(
            &self,
            source: &str,
            range: RevisionRange,
            destination: &Path,
            depth: Depth,
            dry_run: bool,
            record_only: bool,
            _force: bool,
            handler: &mut dyn MergeEventHandler,
        ) -> Result<(), ClientError> {
            self.record_call(format!(
                "range {range} {source} depth={} dry_run={dry_run} record_only={record_only}",
                depth.as_str(),
            ));
            if self.fail_on.contains(&range.end) {
                return Err(ClientError(format!("merge of {range} failed")));
            }
            let outcome = if self.conflict_on.contains(&range.end) {
                FileOutcome::Conflicted
            } else {
                FileOutcome::Merged(MergeAction::Modified)
            };
            handler.on_event(MergeEvent {
                path: destination.join(format!("file-{}.txt", range.end)),
                outcome,
            });
            Ok(())
        }

        fn merge_diff(
            &self,
            source1: &str,
            rev1: Revision,
            source2: &str,
            rev2: Revision,
            destination: &Path,
            _depth: Depth,
            _use_ancestry: bool,
            _dry_run: bool,
            handler: &mut dyn MergeEventHandler,
        ) -> Result<(), ClientError> {
            self.record_call(format!(
                "diff {source1}@{rev1} {source2}@{rev2} -> {}",
                destination.display(),
            ));
            handler.on_event(MergeEvent {
                path: destination.to_path_buf(),
                outcome: FileOutcome::Merged(MergeAction::Modified),
            });
            Ok(())
        }

        fn copy_from(
            &self,
            source: &str,
            revision: Revision,
            destination: &Path,
        ) -> Result<(), ClientError> {
            self.record_call(format!("copy {source}@{revision} -> {}", destination.display()));
            Ok(())
        }

        fn delete(&self, target: &Path) -> Result<(), ClientError> {
            self.record_call(format!("delete {}", target.display()));
            Ok(())
        }
    }

    pub(crate) fn wc() -> PathBuf {
        PathBuf::from("/wc")
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{ClientError, FileOutcome, MergeAction, MergeResult};

    #[test]
    fn test_no_double_counting() {
        // Two batches touching the same file: it must appear once, tagged
        // with the more severe outcome.
        let mut first = MergeResult::new();
        first.record(PathBuf::from("a.txt"), FileOutcome::Merged(MergeAction::Modified));
        first.record(PathBuf::from("b.txt"), FileOutcome::Merged(MergeAction::Added));

        let mut second = MergeResult::new();
        second.record(PathBuf::from("a.txt"), FileOutcome::Conflicted);
        second.record(PathBuf::from("b.txt"), FileOutcome::Merged(MergeAction::Modified));

        first.absorb(second);
        assert_eq!(first.outcome_of(Path::new("a.txt")), Some(FileOutcome::Conflicted));
        assert_eq!(
            first.outcome_of(Path::new("b.txt")),
            Some(FileOutcome::Merged(MergeAction::Added)),
        );
        assert_eq!(first.changed_paths().len(), 2);
    }

    #[test]
    fn test_severity_never_downgrades() {
        let mut result = MergeResult::new();
        result.record(PathBuf::from("a"), FileOutcome::Failed);
        result.record(PathBuf::from("a"), FileOutcome::Conflicted);
        result.record(PathBuf::from("a"), FileOutcome::Merged(MergeAction::Modified));
        assert_eq!(result.outcome_of(Path::new("a")), Some(FileOutcome::Failed));
    }

    #[test]
    fn test_resolve_conflict() {
        let mut result = MergeResult::new();
        result.record(PathBuf::from("a"), FileOutcome::Conflicted);
        assert!(result.has_conflicts());
        result.mark_resolved(Path::new("a"));
        assert!(!result.has_conflicts());
        assert_eq!(
            result.outcome_of(Path::new("a")),
            Some(FileOutcome::Merged(MergeAction::Modified)),
        );
    }

    #[test]
    fn test_errors_and_skipped_accumulate() {
        let mut result = MergeResult::new();
        result.record_error(ClientError("merge failed".into()));
        result.record_skipped([12, 15]);
        assert!(result.has_errors());
        assert_eq!(result.skipped(), &[12, 15]);
    }
}
