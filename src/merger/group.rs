use std::sync::Arc;

use super::Merger;
use crate::client::{Depth, MergeClient, MergeResult};
use crate::repo::{Changelist, MergeContext, Revision, RevisionRange};

/// Decides how many of the remaining revisions the next batch may cover at
/// most. The merger still cuts a batch at the first numbering gap, since a
/// range merge would otherwise drag in unselected revisions.
pub(crate) trait Splitter: Send {
    fn max_pack_size(&self, remaining: usize) -> usize;
}

/// Exactly one revision per `merge_next` call.
pub(crate) struct StepByStepSplitter;

impl Splitter for StepByStepSplitter {
    fn max_pack_size(&self, _remaining: usize) -> usize {
        1
    }
}

/// Larger batches of consecutive revisions, up to a configured chunk size.
pub(crate) struct ChunkSplitter {
    size: usize,
}

impl ChunkSplitter {
    pub(crate) fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }
}

impl Splitter for ChunkSplitter {
    fn max_pack_size(&self, remaining: usize) -> usize {
        self.size.min(remaining)
    }
}

/// Merges a revision-sorted candidate list as a sequence of range merges,
/// one `[pack_start, pack_end]` window per step.
pub(crate) struct GroupMerger {
    client: Arc<dyn MergeClient>,
    ctx: MergeContext,
    lists: Vec<Changelist>,
    splitter: Box<dyn Splitter>,
    /// Reintegrate merges apply the range in reverse direction. Fixed at
    /// construction.
    inverse_range: bool,
    dry_run: bool,
    record_only: bool,
    next_index: usize,
    packs: Vec<(Revision, Revision)>,
    comment_fragments: Vec<String>,
}

impl GroupMerger {
    pub(crate) fn new(
        client: Arc<dyn MergeClient>,
        ctx: MergeContext,
        mut lists: Vec<Changelist>,
        splitter: Box<dyn Splitter>,
        inverse_range: bool,
        dry_run: bool,
        record_only: bool,
    ) -> Self {
        lists.sort_by_key(|list| list.revision);
        lists.dedup_by_key(|list| list.revision);
        Self {
            client,
            ctx,
            lists,
            splitter,
            inverse_range,
            dry_run,
            record_only,
            next_index: 0,
            packs: Vec::new(),
            comment_fragments: Vec::new(),
        }
    }

    /// Windows merged so far, for accounting.
    pub(crate) fn packs(&self) -> &[(Revision, Revision)] {
        &self.packs
    }

    fn next_window_len(&self) -> usize {
        let remaining = self.lists.len() - self.next_index;
        let max = self.splitter.max_pack_size(remaining).clamp(1, remaining);
        let window = &self.lists[self.next_index..];
        let mut len = 1;
        while len < max && window[len].revision == window[len - 1].revision + 1 {
            len += 1;
        }
        len
    }
}

impl Merger for GroupMerger {
    fn has_next(&self) -> bool {
        self.next_index < self.lists.len()
    }

    fn merge_next(&mut self, result: &mut MergeResult) {
        if !self.has_next() {
            return;
        }
        let len = self.next_window_len();
        let window = &self.lists[self.next_index..self.next_index + len];
        let pack_start = window.first().unwrap().revision;
        let pack_end = window.last().unwrap().revision;

        let mut range = RevisionRange::new(pack_start - 1, pack_end);
        if self.inverse_range {
            range = range.inverted();
        }

        tracing::debug!(
            "merging revisions {pack_start}..{pack_end} of {}",
            self.ctx.source_url,
        );
        let merge_result = self.client.merge_range(
            &self.ctx.source_url,
            range,
            &self.ctx.working_copy,
            Depth::Infinity,
            self.dry_run,
            self.record_only,
            false,
            result,
        );
        if let Err(e) = merge_result {
            tracing::warn!("merge of revisions {pack_start}..{pack_end} failed: {e}");
            result.record_error(e);
        }

        for list in window {
            self.comment_fragments.push(format!(
                "{} [from revision {}]",
                list.message.trim_end(),
                list.revision,
            ));
        }
        self.packs.push((pack_start, pack_end));
        self.next_index += len;
    }

    fn comment(&self) -> String {
        self.comment_fragments.join("\n")
    }

    fn processed_revisions(&self) -> Vec<Revision> {
        self.lists[..self.next_index]
            .iter()
            .map(|list| list.revision)
            .collect()
    }

    fn remaining_revisions(&self) -> Vec<Revision> {
        self.lists[self.next_index..]
            .iter()
            .map(|list| list.revision)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ChunkSplitter, GroupMerger, StepByStepSplitter};
    use crate::client::testing::{RecordingClient, wc};
    use crate::client::MergeResult;
    use crate::merger::Merger as _;
    use crate::repo::{Changelist, MergeContext, Revision};

    fn changelist(revision: Revision) -> Changelist {
        Changelist {
            revision,
            author: "alice".into(),
            date: chrono::DateTime::UNIX_EPOCH,
            message: format!("change {revision}"),
            changes: Vec::new(),
        }
    }

    fn ctx() -> MergeContext {
        MergeContext {
            repository_root: "http://r".into(),
            source_url: "http://r/branches/x".into(),
            target_url: "http://r/trunk".into(),
            branch_name: "x".into(),
            working_copy: wc(),
        }
    }

    fn merger(
        revisions: &[Revision],
        splitter: impl super::Splitter + 'static,
        inverse: bool,
    ) -> (GroupMerger, Arc<RecordingClient>) {
        let client = Arc::new(RecordingClient::default());
        let merger = GroupMerger::new(
            client.clone(),
            ctx(),
            revisions.iter().copied().map(changelist).collect(),
            Box::new(splitter),
            inverse,
            false,
            false,
        );
        (merger, client)
    }

    #[test]
    fn test_step_by_step_advances_one_revision() {
        let (mut merger, client) = merger(&[12, 15], StepByStepSplitter, false);
        let mut result = MergeResult::new();

        assert!(merger.has_next());
        merger.merge_next(&mut result);
        assert_eq!(merger.packs(), [(12, 12)]);
        assert!(merger.has_next());
        merger.merge_next(&mut result);
        assert_eq!(merger.packs(), [(12, 12), (15, 15)]);
        assert!(!merger.has_next());

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("range 11:12 "));
        assert!(calls[1].starts_with("range 14:15 "));
        assert!(!result.has_errors());
    }

    #[test]
    fn test_batch_accounting() {
        // Windows must be contiguous, non-overlapping, strictly increasing,
        // and sum to the candidate count.
        let revisions = [3, 4, 5, 6, 9, 10, 11, 20];
        let (mut merger, _client) = merger(&revisions, ChunkSplitter::new(3), false);
        let mut result = MergeResult::new();
        while merger.has_next() {
            merger.merge_next(&mut result);
        }

        let mut covered = 0;
        let mut last_end = 0;
        for &(start, end) in merger.packs() {
            assert!(start > last_end);
            assert!(end >= start);
            covered += revisions
                .iter()
                .filter(|rev| (start..=end).contains(*rev))
                .count();
            // Every revision inside a window was a candidate; gaps split
            // windows.
            for rev in start..=end {
                assert!(revisions.contains(&rev));
            }
            last_end = end;
        }
        assert_eq!(covered, revisions.len());
        assert_eq!(merger.processed_revisions(), revisions);
        assert!(merger.remaining_revisions().is_empty());
    }

    #[test]
    fn test_inverse_range() {
        let (mut merger, client) = merger(&[12], StepByStepSplitter, true);
        merger.merge_next(&mut MergeResult::new());
        assert!(client.calls()[0].starts_with("range 12:11 "));
    }

    #[test]
    fn test_error_recorded_and_iteration_continues() {
        let client = Arc::new(RecordingClient {
            fail_on: [12].into_iter().collect(),
            ..RecordingClient::default()
        });
        let mut merger = GroupMerger::new(
            client.clone(),
            ctx(),
            [12, 15].iter().copied().map(changelist).collect(),
            Box::new(StepByStepSplitter),
            false,
            false,
            false,
        );
        let mut result = MergeResult::new();
        merger.merge_next(&mut result);
        assert!(result.has_errors());
        // The failure is captured, not thrown: the next batch is still
        // offered.
        assert!(merger.has_next());
        merger.merge_next(&mut result);
        assert!(!merger.has_next());
        assert_eq!(result.errors().len(), 1);
    }

    #[test]
    fn test_comment_fragments() {
        let (mut merger, _client) = merger(&[12, 15], StepByStepSplitter, false);
        let mut result = MergeResult::new();
        merger.merge_next(&mut result);
        merger.merge_next(&mut result);
        assert_eq!(
            merger.comment(),
            "change 12 [from revision 12]\nchange 15 [from revision 15]",
        );
    }
}
