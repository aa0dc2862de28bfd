use std::sync::Mutex;

use smallvec::SmallVec;

use crate::FHashMap;
use crate::client::{ClientError, MergeClient};
use crate::repo::{Changelist, MergeContext, Revision, is_url_ancestor};

/// Classification of a candidate revision against the target's
/// merge-tracking metadata. Every loaded revision falls into exactly one
/// class.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum MergeCheckResult {
    NotMerged,
    Merged,
    /// The revision does not apply to this source/target pair at all, e.g.
    /// it was logged across a rename boundary.
    Foreign,
}

/// Inclusive revision ranges, sorted and non-overlapping.
type RangeList = SmallVec<[(Revision, Revision); 4]>;

#[derive(Debug)]
pub(crate) enum MergeInfoParseError {
    BadLine(usize, String),
}

impl std::fmt::Display for MergeInfoParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadLine(line, line_data) => {
                write!(f, "bad mergeinfo line {}: {line_data:?}", line + 1)
            }
        }
    }
}

/// Parsed `svn:mergeinfo` property: merge source path (repository-relative,
/// leading slash) -> revision ranges already applied to the target.
pub(crate) struct MergeInfo {
    paths: FHashMap<String, RangeList>,
}

impl MergeInfo {
    pub(crate) fn parse(text: &str) -> Result<Self, MergeInfoParseError> {
        let mut paths = FHashMap::default();
        for (line_i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Some((path, ranges)) => {
                    paths.insert(path.to_owned(), ranges);
                }
                None => return Err(MergeInfoParseError::BadLine(line_i, line.to_owned())),
            }
        }
        Ok(Self { paths })
    }

    /// Ranges recorded for merges out of `source_path`, i.e. the union of
    /// the entries whose path covers the whole source branch. Entries for
    /// sub-paths record partial merges and do not count.
    fn ranges_covering(&self, source_path: &str) -> RangeList {
        let mut out = RangeList::new();
        for (path, ranges) in self.paths.iter() {
            if is_url_ancestor(path, source_path) {
                out.extend(ranges.iter().copied());
            }
        }
        out.sort_unstable();
        out
    }
}

fn parse_line(line: &str) -> Option<(&str, RangeList)> {
    let (path, ranges_raw) = line.rsplit_once(':')?;
    if path.is_empty() {
        return None;
    }

    let mut ranges = RangeList::new();
    for part in ranges_raw.split(',') {
        // A trailing '*' marks a non-inheritable range; it still counts as
        // recorded for the path itself.
        let part = part.strip_suffix('*').unwrap_or(part);
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (start.parse().ok()?, end.parse().ok()?),
            None => {
                let rev: Revision = part.parse().ok()?;
                (rev, rev)
            }
        };
        if start > end {
            return None;
        }
        ranges.push((start, end));
    }
    ranges.sort_unstable();
    Some((path, ranges))
}

fn ranges_contain(ranges: &RangeList, revision: Revision) -> bool {
    let idx = ranges.partition_point(|&(start, _)| start <= revision);
    idx > 0 && ranges[idx - 1].1 >= revision
}

/// Answers "is revision R already applied to the target?" from the target's
/// merge-tracking metadata, fetched once in [`Self::prepare`]. Range lookups
/// are memoized per revision so a revision picker can query thousands of
/// candidates cheaply; revisions merged during the session are added through
/// [`Self::record_merged`] so later queries see them as merged.
pub(crate) struct MergeInfoClassifier {
    source_path: String,
    state: Mutex<ClassifierState>,
}

struct ClassifierState {
    merged: RangeList,
    memo: FHashMap<Revision, MergeCheckResult>,
}

#[derive(Debug)]
pub(crate) enum PrepareError {
    Client(ClientError),
    Parse(MergeInfoParseError),
}

impl std::fmt::Display for PrepareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client(e) => write!(f, "failed to fetch merge-tracking metadata: {e}"),
            Self::Parse(e) => write!(f, "failed to parse merge-tracking metadata: {e}"),
        }
    }
}

impl MergeInfoClassifier {
    /// Fetches the target's `svn:mergeinfo` once and builds the in-memory
    /// index. A classifier only exists after a successful prepare, so
    /// classification before preparation is impossible by construction.
    pub(crate) fn prepare(
        client: &dyn MergeClient,
        ctx: &MergeContext,
    ) -> Result<Self, PrepareError> {
        let raw = client
            .mergeinfo(&ctx.working_copy)
            .map_err(PrepareError::Client)?;
        let info = match raw {
            Some(text) => MergeInfo::parse(&text).map_err(PrepareError::Parse)?,
            None => MergeInfo {
                paths: FHashMap::default(),
            },
        };
        Ok(Self::from_info(&info, ctx.source_path()))
    }

    pub(crate) fn from_info(info: &MergeInfo, source_path: String) -> Self {
        let merged = info.ranges_covering(&source_path);
        Self {
            source_path,
            state: Mutex::new(ClassifierState {
                merged,
                memo: FHashMap::default(),
            }),
        }
    }

    pub(crate) fn classify(&self, list: &Changelist) -> MergeCheckResult {
        // Foreign depends on the paths of this particular changelist, not on
        // the revision number, so it is never memoized.
        let touches_source = list
            .changes
            .iter()
            .any(|change| is_url_ancestor(&self.source_path, &change.path));
        if !touches_source {
            return MergeCheckResult::Foreign;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(&memoized) = state.memo.get(&list.revision) {
            return memoized;
        }
        let result = if ranges_contain(&state.merged, list.revision) {
            MergeCheckResult::Merged
        } else {
            MergeCheckResult::NotMerged
        };
        state.memo.insert(list.revision, result);
        result
    }

    /// Records revisions merged during this session, so a later query
    /// reflects the new merge-tracking state instead of the snapshot taken
    /// at prepare time.
    pub(crate) fn record_merged(&self, revisions: &[Revision]) {
        let mut state = self.state.lock().unwrap();
        for &revision in revisions {
            state.merged.push((revision, revision));
            state.memo.insert(revision, MergeCheckResult::Merged);
        }
        state.merged.sort_unstable();
    }
}

#[cfg(test)]
mod tests {
    use super::{MergeCheckResult, MergeInfo, MergeInfoClassifier};
    use crate::repo::{Changelist, PathChange, Revision};

    fn changelist(revision: Revision, paths: &[&str]) -> Changelist {
        Changelist {
            revision,
            author: "alice".into(),
            date: chrono::DateTime::UNIX_EPOCH,
            message: format!("change {revision}"),
            changes: paths
                .iter()
                .map(|path| PathChange {
                    path: (*path).to_owned(),
                    before: Some(revision - 1),
                    after: Some(revision),
                })
                .collect(),
        }
    }

    fn classifier(text: &str) -> MergeInfoClassifier {
        let info = MergeInfo::parse(text).unwrap();
        MergeInfoClassifier::from_info(&info, "/branches/x".into())
    }

    #[test]
    fn test_parse_ranges() {
        let info = MergeInfo::parse("/branches/x:2-10,14,20*\n/other:5\n").unwrap();
        let ranges = info.ranges_covering("/branches/x");
        assert_eq!(ranges.as_slice(), [(2, 10), (14, 14), (20, 20)]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(MergeInfo::parse("no-colon-here").is_err());
        assert!(MergeInfo::parse("/p:10-4").is_err());
        assert!(MergeInfo::parse("/p:abc").is_err());
    }

    #[test]
    fn test_subpath_entries_do_not_count() {
        let info = MergeInfo::parse("/branches/x/sub:1-100\n").unwrap();
        let classifier = MergeInfoClassifier::from_info(&info, "/branches/x".into());
        assert_eq!(
            classifier.classify(&changelist(10, &["/branches/x/sub/file"])),
            MergeCheckResult::NotMerged,
        );
    }

    #[test]
    fn test_classification_is_total() {
        let classifier = classifier("/branches/x:2-10,14\n");

        assert_eq!(
            classifier.classify(&changelist(10, &["/branches/x/file"])),
            MergeCheckResult::Merged,
        );
        assert_eq!(
            classifier.classify(&changelist(12, &["/branches/x/file"])),
            MergeCheckResult::NotMerged,
        );
        assert_eq!(
            classifier.classify(&changelist(12, &["/unrelated/file"])),
            MergeCheckResult::Foreign,
        );
        // Every loaded revision classifies into exactly one bucket.
        for rev in 1..30 {
            let list = changelist(rev, &["/branches/x/file"]);
            let result = classifier.classify(&list);
            assert!(matches!(
                result,
                MergeCheckResult::Merged | MergeCheckResult::NotMerged | MergeCheckResult::Foreign,
            ));
        }
    }

    #[test]
    fn test_same_revision_different_paths() {
        // Foreign is a property of a changelist's paths, not of its revision
        // number: querying in either order must not leak a cached answer.
        let classifier = classifier("/branches/x:2-10\n");
        assert_eq!(
            classifier.classify(&changelist(12, &["/unrelated/file"])),
            MergeCheckResult::Foreign,
        );
        assert_eq!(
            classifier.classify(&changelist(12, &["/branches/x/file"])),
            MergeCheckResult::NotMerged,
        );
        assert_eq!(
            classifier.classify(&changelist(12, &["/unrelated/file"])),
            MergeCheckResult::Foreign,
        );
    }

    #[test]
    fn test_recorded_merges_change_classification() {
        let classifier = classifier("/branches/x:2-10\n");
        let list = changelist(12, &["/branches/x/file"]);
        assert_eq!(classifier.classify(&list), MergeCheckResult::NotMerged);
        classifier.record_merged(&[12]);
        assert_eq!(classifier.classify(&list), MergeCheckResult::Merged);
    }
}
