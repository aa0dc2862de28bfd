use std::sync::Arc;

use super::Merger;
use crate::branch_points::WrapperInvertor;
use crate::client::{Depth, MergeClient, MergeResult};
use crate::repo::{MergeContext, Revision, RevisionRange};

enum Mode {
    /// Single metadata-aware merge; the server auto-detects sync vs.
    /// reintegrate.
    Tracked,
    /// Legacy path for servers without merge tracking: an explicit range
    /// computed from the cached copy point up to the branch head.
    Range(RevisionRange),
}

/// One-shot whole-branch merge. `has_next` is true exactly once.
pub(crate) struct BranchMerger {
    client: Arc<dyn MergeClient>,
    ctx: MergeContext,
    mode: Mode,
    reintegrate: bool,
    dry_run: bool,
    record_only: bool,
    done: bool,
}

impl BranchMerger {
    pub(crate) fn tracked(
        client: Arc<dyn MergeClient>,
        ctx: MergeContext,
        reintegrate: bool,
        dry_run: bool,
        record_only: bool,
    ) -> Self {
        Self {
            client,
            ctx,
            mode: Mode::Tracked,
            reintegrate,
            dry_run,
            record_only,
            done: false,
        }
    }

    pub(crate) fn ranged(
        client: Arc<dyn MergeClient>,
        ctx: MergeContext,
        copy_point: &WrapperInvertor,
        latest: Revision,
        dry_run: bool,
        record_only: bool,
    ) -> Self {
        let range = RevisionRange::new(copy_point.source_boundary(), latest);
        Self {
            client,
            ctx,
            mode: Mode::Range(range),
            reintegrate: copy_point.is_reintegrate(),
            dry_run,
            record_only,
            done: false,
        }
    }
}

impl Merger for BranchMerger {
    fn has_next(&self) -> bool {
        !self.done
    }

    fn merge_next(&mut self, result: &mut MergeResult) {
        if self.done {
            return;
        }
        self.done = true;

        let merge_result = match self.mode {
            Mode::Tracked => self.client.merge_tracked(
                &self.ctx.source_url,
                &self.ctx.working_copy,
                self.dry_run,
                result,
            ),
            Mode::Range(range) => self.client.merge_range(
                &self.ctx.source_url,
                range,
                &self.ctx.working_copy,
                Depth::Infinity,
                self.dry_run,
                self.record_only,
                false,
                result,
            ),
        };
        if let Err(e) = merge_result {
            tracing::warn!("whole-branch merge of {} failed: {e}", self.ctx.source_url);
            result.record_error(e);
        }
    }

    fn comment(&self) -> String {
        if self.reintegrate {
            format!("Reintegrated {} into the working copy", self.ctx.branch_name)
        } else {
            format!("Merged from {}", self.ctx.branch_name)
        }
    }

    fn processed_revisions(&self) -> Vec<Revision> {
        Vec::new()
    }

    fn remaining_revisions(&self) -> Vec<Revision> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::BranchMerger;
    use crate::branch_points::{BranchCopyData, WrapperInvertor};
    use crate::client::MergeResult;
    use crate::client::testing::{RecordingClient, wc};
    use crate::merger::Merger as _;
    use crate::repo::MergeContext;

    fn ctx() -> MergeContext {
        MergeContext {
            repository_root: "http://r".into(),
            source_url: "http://r/branches/x".into(),
            target_url: "http://r/trunk".into(),
            branch_name: "x".into(),
            working_copy: wc(),
        }
    }

    #[test]
    fn test_tracked_runs_exactly_once() {
        let client = Arc::new(RecordingClient::default());
        let mut merger = BranchMerger::tracked(client.clone(), ctx(), false, false, false);
        let mut result = MergeResult::new();

        assert!(merger.has_next());
        merger.merge_next(&mut result);
        assert!(!merger.has_next());
        merger.merge_next(&mut result);

        assert_eq!(client.calls().len(), 1);
        assert!(client.calls()[0].starts_with("tracked "));
        assert_eq!(merger.comment(), "Merged from x");
    }

    #[test]
    fn test_legacy_range_from_copy_point() {
        let client = Arc::new(RecordingClient::default());
        let copy_point = WrapperInvertor {
            inverted: false,
            wrapped: BranchCopyData {
                source_url: "http://r/branches/x".into(),
                source_revision: 8,
                target_url: "http://r/trunk".into(),
                target_revision: 9,
            },
        };
        let mut merger =
            BranchMerger::ranged(client.clone(), ctx(), &copy_point, 20, false, false);
        merger.merge_next(&mut MergeResult::new());
        assert!(client.calls()[0].starts_with("range 8:20 "));
    }

    #[test]
    fn test_reintegrate_comment_wording() {
        let client = Arc::new(RecordingClient::default());
        let merger = BranchMerger::tracked(client, ctx(), true, false, false);
        assert_eq!(merger.comment(), "Reintegrated x into the working copy");
    }
}
