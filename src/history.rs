use std::sync::Arc;

use crate::branch_points::BranchCopyData;
use crate::client::ClientError;
use crate::repo::{Changelist, Revision};

pub(crate) const DEFAULT_PAGE_SIZE: usize = 100;

pub(crate) const PAGE_SIZE_ENV_VAR: &str = "SVN_QUICK_MERGE_PAGE_SIZE";

/// Page size override from the environment, if present and valid.
pub(crate) fn page_size_from_env() -> Option<usize> {
    let raw = std::env::var(PAGE_SIZE_ENV_VAR).ok()?;
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!("ignoring invalid {PAGE_SIZE_ENV_VAR} value {raw:?}");
            None
        }
    }
}

/// Read access to the committed history of the repository.
pub(crate) trait RepositoryHistory: Send + Sync {
    /// Committed changelists on `location` with revisions in
    /// `[after, before]`, newest first, at most `limit` items.
    fn log_range(
        &self,
        location: &str,
        before: Revision,
        after: Revision,
        limit: usize,
    ) -> Result<Vec<Changelist>, ClientError>;

    /// The first revision at which one of the two URLs appears in the
    /// ancestry of the other, i.e. the copy that created the younger branch.
    /// `Ok(None)` means the branches share no visible history.
    fn find_copy_point(
        &self,
        repository_root: &str,
        url1: &str,
        url2: &str,
    ) -> Result<Option<BranchCopyData>, ClientError>;

    fn latest_revision(&self, location: &str) -> Result<Revision, ClientError>;
}

pub(crate) struct LoadedPage {
    /// Ascending by revision number, regardless of wire order.
    pub(crate) changelists: Vec<Changelist>,
    pub(crate) is_last: bool,
}

/// Paginated, oldest-unseen-first fetch of the source branch history.
pub(crate) struct RevisionLoader {
    history: Arc<dyn RepositoryHistory>,
    location: String,
    page_size: usize,
    /// The copy point itself; its revision is excluded from results so the
    /// branch-creating commit is never offered for merging.
    boundary: Option<Revision>,
}

impl RevisionLoader {
    pub(crate) fn new(
        history: Arc<dyn RepositoryHistory>,
        location: String,
        page_size: usize,
        boundary: Option<Revision>,
    ) -> Self {
        Self {
            history,
            location,
            page_size,
            boundary,
        }
    }

    /// Loads one page of revisions strictly before `before` (exclusive).
    /// Requests one extra item to detect the last page without a separate
    /// existence check.
    pub(crate) fn load_before(
        &self,
        before: Revision,
        latest: Revision,
    ) -> Result<LoadedPage, ClientError> {
        let upper = before.saturating_sub(1).min(latest);
        let lower = self.boundary.map_or(1, |b| b.saturating_add(1)).max(1);
        if upper < lower {
            return Ok(LoadedPage {
                changelists: Vec::new(),
                is_last: true,
            });
        }

        let limit = self.page_size + 1;
        let mut page = self
            .history
            .log_range(&self.location, upper, lower, limit)?;

        let is_last = page.len() < limit;
        // Wire order is newest first; the extra item is the oldest one.
        if !is_last {
            page.pop();
        }
        page.sort_by_key(|list| list.revision);
        page.retain(|list| Some(list.revision) != self.boundary);

        Ok(LoadedPage {
            changelists: page,
            is_last,
        })
    }

    /// Loads every revision after `after` (exclusive) up to `latest`,
    /// paginating internally.
    pub(crate) fn load_after(
        &self,
        after: Revision,
        latest: Revision,
    ) -> Result<Vec<Changelist>, ClientError> {
        let mut all = Vec::new();
        let mut before = latest.saturating_add(1);
        loop {
            let page = self.load_before(before, latest)?;
            let page_oldest = page.changelists.first().map(|list| list.revision);
            all.extend(
                page.changelists
                    .into_iter()
                    .filter(|list| list.revision > after),
            );
            match page_oldest {
                Some(oldest) if !page.is_last && oldest > after => before = oldest,
                _ => break,
            }
        }
        all.sort_by_key(|list| list.revision);
        all.dedup_by_key(|list| list.revision);
        Ok(all)
    }
}
