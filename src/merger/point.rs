use std::cmp::Ordering;
use std::sync::Arc;

use super::Merger;
use crate::client::{Depth, FileOutcome, MergeAction, MergeClient, MergeResult};
use crate::repo::{Changelist, MergeContext, PathChange, Revision};

/// Merges one hand-picked changeset by replaying its file-level operations
/// instead of a server-side revision-range merge: additions become
/// copy-from-source, deletions become deletes, everything else a path-scoped
/// two-revision diff merge.
pub(crate) struct PointMerger {
    client: Arc<dyn MergeClient>,
    ctx: MergeContext,
    list: Changelist,
    dry_run: bool,
    done: bool,
}

impl PointMerger {
    pub(crate) fn new(
        client: Arc<dyn MergeClient>,
        ctx: MergeContext,
        list: Changelist,
        dry_run: bool,
    ) -> Self {
        Self {
            client,
            ctx,
            list,
            dry_run,
            done: false,
        }
    }

    fn replay_change(&self, change: &PathChange, result: &mut MergeResult) {
        let Some(wc_path) = self.ctx.wc_path_for(&change.path) else {
            // Paths outside the source branch (logged across a rename) have
            // no counterpart in the working copy.
            tracing::debug!("skipping foreign path {}", change.path);
            return;
        };
        let source_url = self.ctx.url_for(&change.path);

        let call_result = match (change.before, change.after) {
            (None, Some(revision)) => {
                let r = if self.dry_run {
                    Ok(())
                } else {
                    self.client.copy_from(&source_url, revision, &wc_path)
                };
                if r.is_ok() {
                    result.record(wc_path.clone(), FileOutcome::Merged(MergeAction::Added));
                }
                r
            }
            (Some(_), None) => {
                let r = if self.dry_run {
                    Ok(())
                } else {
                    self.client.delete(&wc_path)
                };
                if r.is_ok() {
                    result.record(wc_path.clone(), FileOutcome::Merged(MergeAction::Deleted));
                }
                r
            }
            (Some(before), Some(after)) => self.client.merge_diff(
                &source_url,
                before,
                &source_url,
                after,
                &wc_path,
                Depth::Empty,
                true,
                self.dry_run,
                result,
            ),
            (None, None) => Ok(()),
        };

        if let Err(e) = call_result {
            tracing::warn!("failed to replay change of {}: {e}", change.path);
            result.record(wc_path, FileOutcome::Failed);
            result.record_error(e);
        }
    }
}

/// Additions and modifications come first, ordered so that a parent
/// directory's add is applied before any child path inside it; entries with
/// no "after" state (deletions) sort last, deepest first.
fn change_order(a: &PathChange, b: &PathChange) -> Ordering {
    match (a.after.is_some(), b.after.is_some()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => a.path.cmp(&b.path),
        (false, false) => b.path.cmp(&a.path),
    }
}

impl Merger for PointMerger {
    fn has_next(&self) -> bool {
        !self.done
    }

    fn merge_next(&mut self, result: &mut MergeResult) {
        if self.done {
            return;
        }
        self.done = true;

        let mut changes = self.list.changes.clone();
        changes.sort_by(change_order);
        for change in &changes {
            self.replay_change(change, result);
        }
    }

    fn comment(&self) -> String {
        format!(
            "{} [from revision {}]",
            self.list.message.trim_end(),
            self.list.revision,
        )
    }

    fn processed_revisions(&self) -> Vec<Revision> {
        if self.done {
            vec![self.list.revision]
        } else {
            Vec::new()
        }
    }

    fn remaining_revisions(&self) -> Vec<Revision> {
        if self.done {
            Vec::new()
        } else {
            vec![self.list.revision]
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::PointMerger;
    use crate::client::MergeResult;
    use crate::client::testing::{RecordingClient, wc};
    use crate::merger::Merger as _;
    use crate::repo::{Changelist, MergeContext, PathChange};

    fn ctx() -> MergeContext {
        MergeContext {
            repository_root: "http://r".into(),
            source_url: "http://r/branches/x".into(),
            target_url: "http://r/trunk".into(),
            branch_name: "x".into(),
            working_copy: wc(),
        }
    }

    fn changelist(changes: Vec<PathChange>) -> Changelist {
        Changelist {
            revision: 15,
            author: "alice".into(),
            date: chrono::DateTime::UNIX_EPOCH,
            message: "rework layout".into(),
            changes,
        }
    }

    #[test]
    fn test_replay_order_and_operations() {
        let client = Arc::new(RecordingClient::default());
        let list = changelist(vec![
            PathChange {
                path: "/branches/x/old.txt".into(),
                before: Some(14),
                after: None,
            },
            PathChange {
                path: "/branches/x/dir/new.txt".into(),
                before: None,
                after: Some(15),
            },
            PathChange {
                path: "/branches/x/dir".into(),
                before: None,
                after: Some(15),
            },
            PathChange {
                path: "/branches/x/kept.txt".into(),
                before: Some(14),
                after: Some(15),
            },
        ]);
        let mut merger = PointMerger::new(client.clone(), ctx(), list, false);
        let mut result = MergeResult::new();

        assert!(merger.has_next());
        merger.merge_next(&mut result);
        assert!(!merger.has_next());

        let calls = client.calls();
        // The directory add precedes the add of the file inside it; the
        // deletion comes last.
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], "copy http://r/branches/x/dir@15 -> /wc/dir");
        assert_eq!(
            calls[1],
            "copy http://r/branches/x/dir/new.txt@15 -> /wc/dir/new.txt",
        );
        assert!(calls[2].starts_with("diff http://r/branches/x/kept.txt@14"));
        assert_eq!(calls[3], "delete /wc/old.txt");

        assert_eq!(result.changed_paths().len(), 4);
        assert_eq!(merger.processed_revisions(), [15]);
    }

    #[test]
    fn test_foreign_paths_skipped() {
        let client = Arc::new(RecordingClient::default());
        let list = changelist(vec![PathChange {
            path: "/unrelated/file.txt".into(),
            before: Some(14),
            after: Some(15),
        }]);
        let mut merger = PointMerger::new(client.clone(), ctx(), list, false);
        let mut result = MergeResult::new();
        merger.merge_next(&mut result);
        assert!(client.calls().is_empty());
        assert!(result.is_nothing_changed());
    }

    #[test]
    fn test_comment_carries_revision() {
        let client = Arc::new(RecordingClient::default());
        let merger = PointMerger::new(client, ctx(), changelist(Vec::new()), false);
        assert_eq!(merger.comment(), "rework layout [from revision 15]");
    }
}
