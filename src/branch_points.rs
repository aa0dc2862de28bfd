use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::history::RepositoryHistory;
use crate::repo::{Revision, is_url_ancestor};

/// An immutable historical fact: `target` was copied from `source` at the
/// given revision pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BranchCopyData {
    pub(crate) source_url: String,
    pub(crate) source_revision: Revision,
    pub(crate) target_url: String,
    pub(crate) target_revision: Revision,
}

impl BranchCopyData {
    pub(crate) fn invert(&self) -> Self {
        Self {
            source_url: self.target_url.clone(),
            source_revision: self.target_revision,
            target_url: self.source_url.clone(),
            target_revision: self.source_revision,
        }
    }
}

/// A copy point plus the sense in which it was discovered. The calculator
/// may find the relationship from either side; `get_true` always yields the
/// pair oriented merge-from -> merge-into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct WrapperInvertor {
    pub(crate) inverted: bool,
    pub(crate) wrapped: BranchCopyData,
}

impl WrapperInvertor {
    pub(crate) fn get_true(&self) -> BranchCopyData {
        if self.inverted {
            self.wrapped.invert()
        } else {
            self.wrapped.clone()
        }
    }

    /// True when the merge source is the branch that was created by the
    /// copy, i.e. the merge folds a feature branch back into its origin.
    pub(crate) fn is_reintegrate(&self) -> bool {
        self.inverted
    }

    /// Revision of the merge source at the copy point, the lower bound of
    /// any legacy range merge.
    pub(crate) fn source_boundary(&self) -> Revision {
        let oriented = self.get_true();
        oriented.source_revision
    }
}

#[derive(Debug)]
struct DeserializeError;

const STORE_MAGIC: &[u8; 8] = b"SVNQMBP\x01";

fn serialize_u32_into(value: u32, out: &mut Vec<u8>) {
    out.extend(value.to_le_bytes());
}

fn serialize_str_into(value: &str, out: &mut Vec<u8>) {
    serialize_u32_into(value.len() as u32, out);
    out.extend(value.as_bytes());
}

fn deserialize_u32_from(src: &mut &[u8]) -> Result<u32, DeserializeError> {
    let array;
    (array, *src) = src.split_first_chunk().ok_or(DeserializeError)?;
    Ok(u32::from_le_bytes(*array))
}

fn deserialize_str_from(src: &mut &[u8]) -> Result<String, DeserializeError> {
    let len = deserialize_u32_from(src)? as usize;
    if src.len() < len {
        return Err(DeserializeError);
    }
    let data;
    (data, *src) = src.split_at(len);
    String::from_utf8(data.to_vec()).map_err(|_| DeserializeError)
}

fn deserialize_copy_data_from(src: &mut &[u8]) -> Result<BranchCopyData, DeserializeError> {
    Ok(BranchCopyData {
        source_url: deserialize_str_from(src)?,
        source_revision: deserialize_u32_from(src)?,
        target_url: deserialize_str_from(src)?,
        target_revision: deserialize_u32_from(src)?,
    })
}

/// On-disk map: repository root URL -> sorted map of branch URL ->
/// copy-point record. Sorted so that any URL under a cached branch path
/// resolves by longest-prefix (floor) lookup.
struct BranchPointStore {
    path: PathBuf,
    repos: BTreeMap<String, BTreeMap<String, BranchCopyData>>,
}

impl BranchPointStore {
    fn load(path: PathBuf) -> Self {
        let repos = match std::fs::read(&path) {
            Ok(raw) => match Self::deserialize(&raw) {
                Ok(repos) => repos,
                Err(DeserializeError) => {
                    tracing::warn!("branch point cache {path:?} is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("failed to read branch point cache {path:?}: {e}");
                BTreeMap::new()
            }
        };
        Self { path, repos }
    }

    fn deserialize(
        mut src: &[u8],
    ) -> Result<BTreeMap<String, BTreeMap<String, BranchCopyData>>, DeserializeError> {
        let src = &mut src;
        let magic: [u8; 8] = {
            let array;
            (array, *src) = src.split_first_chunk().ok_or(DeserializeError)?;
            *array
        };
        if magic != *STORE_MAGIC {
            return Err(DeserializeError);
        }

        let mut repos = BTreeMap::new();
        let num_repos = deserialize_u32_from(src)?;
        for _ in 0..num_repos {
            let repo_url = deserialize_str_from(src)?;
            let num_entries = deserialize_u32_from(src)?;
            let mut entries = BTreeMap::new();
            for _ in 0..num_entries {
                let branch_url = deserialize_str_from(src)?;
                let data = deserialize_copy_data_from(src)?;
                entries.insert(branch_url, data);
            }
            repos.insert(repo_url, entries);
        }
        if !src.is_empty() {
            return Err(DeserializeError);
        }
        Ok(repos)
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(STORE_MAGIC);
        serialize_u32_into(self.repos.len() as u32, &mut out);
        for (repo_url, entries) in self.repos.iter() {
            serialize_str_into(repo_url, &mut out);
            serialize_u32_into(entries.len() as u32, &mut out);
            for (branch_url, data) in entries.iter() {
                serialize_str_into(branch_url, &mut out);
                serialize_str_into(&data.source_url, &mut out);
                serialize_u32_into(data.source_revision, &mut out);
                serialize_str_into(&data.target_url, &mut out);
                serialize_u32_into(data.target_revision, &mut out);
            }
        }
        out
    }

    /// Recomputing a copy point is expensive, so the store is flushed to
    /// disk on every insertion.
    fn persist(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        std::io::Write::write_all(&mut file, &self.serialize())?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Longest-prefix (floor) lookup: the entry of the deepest cached branch
    /// URL that `url` lies under.
    fn floor(&self, repo_url: &str, url: &str) -> Option<&BranchCopyData> {
        let entries = self.repos.get(repo_url)?;
        entries
            .range::<str, _>((
                std::ops::Bound::Unbounded,
                std::ops::Bound::Included(url),
            ))
            .rev()
            .find(|(branch_url, _)| is_url_ancestor(branch_url, url))
            .map(|(_, data)| data)
    }

    fn insert(&mut self, repo_url: &str, branch_url: String, data: BranchCopyData) {
        self.repos
            .entry(repo_url.to_owned())
            .or_default()
            .insert(branch_url, data);
    }
}

/// Computes and persistently caches the historical copy point joining two
/// branches. Branch history is immutable, so entries are never invalidated.
///
/// One instance is shared by all merge operations against the same
/// repository connection; the mutex covers both lookup and the
/// persist-on-write so concurrent operations never observe a torn store.
pub(crate) struct BranchPointCache {
    history: Arc<dyn RepositoryHistory>,
    store: Mutex<BranchPointStore>,
}

impl BranchPointCache {
    pub(crate) fn open(path: PathBuf, history: Arc<dyn RepositoryHistory>) -> Self {
        Self {
            history,
            store: Mutex::new(BranchPointStore::load(path)),
        }
    }

    /// Cached lookup only; `None` means the relationship has not been
    /// computed yet (or the URLs are unrelated to every cached entry).
    pub(crate) fn get_copy_point(
        &self,
        repo_url: &str,
        source_url: &str,
        target_url: &str,
    ) -> Option<WrapperInvertor> {
        let store = self.store.lock().unwrap();
        let from_source = store
            .floor(repo_url, source_url)
            .and_then(|data| orient(data, source_url, target_url));
        let from_target = store
            .floor(repo_url, target_url)
            .and_then(|data| orient(data, source_url, target_url));

        match (from_source, from_target) {
            (Some(a), Some(b)) => {
                // When both sides resolve, the copy with the higher target
                // revision is the later fact and wins.
                if a.wrapped.target_revision >= b.wrapped.target_revision {
                    Some(a)
                } else {
                    Some(b)
                }
            }
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Cached lookup, falling back to a repository history scan. The scan is
    /// the expensive path; its result is persisted before being returned.
    /// `None` means the branches share no visible history (or the scan
    /// failed, which is logged and downgraded to the same answer).
    pub(crate) fn compute_and_cache(
        &self,
        repo_url: &str,
        source_url: &str,
        target_url: &str,
    ) -> Option<WrapperInvertor> {
        if let Some(found) = self.get_copy_point(repo_url, source_url, target_url) {
            return Some(found);
        }

        let data = match self
            .history
            .find_copy_point(repo_url, source_url, target_url)
        {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(
                    "history scan for copy point of {source_url} and {target_url} failed: {e}",
                );
                return None;
            }
        };

        // Keyed by the ancestor side, which is the shorter branch path.
        let key = if data.source_url.len() <= data.target_url.len() {
            data.source_url.clone()
        } else {
            data.target_url.clone()
        };

        let mut store = self.store.lock().unwrap();
        store.insert(repo_url, key, data.clone());
        if let Err(e) = store.persist() {
            tracing::warn!("failed to persist branch point cache: {e}");
        }
        drop(store);

        orient(&data, source_url, target_url)
    }
}

/// Orients a cached record against the requested merge direction. The result
/// is non-inverted when the record already reads merge-from -> merge-into,
/// inverted when it was discovered from the other side, and `None` when the
/// record does not relate the two URLs at all.
fn orient(
    data: &BranchCopyData,
    source_url: &str,
    target_url: &str,
) -> Option<WrapperInvertor> {
    if is_url_ancestor(&data.source_url, source_url) && is_url_ancestor(&data.target_url, target_url)
    {
        Some(WrapperInvertor {
            inverted: false,
            wrapped: data.clone(),
        })
    } else if is_url_ancestor(&data.target_url, source_url)
        && is_url_ancestor(&data.source_url, target_url)
    {
        Some(WrapperInvertor {
            inverted: true,
            wrapped: data.clone(),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{BranchCopyData, BranchPointCache, WrapperInvertor};
    use crate::client::ClientError;
    use crate::history::RepositoryHistory;
    use crate::repo::{Changelist, Revision};

    struct ScanHistory {
        answer: Option<BranchCopyData>,
        scans: AtomicUsize,
    }

    impl RepositoryHistory for ScanHistory {
        fn log_range(
            &self,
            _location: &str,
            _before: Revision,
            _after: Revision,
            _limit: usize,
        ) -> Result<Vec<Changelist>, ClientError> {
            Ok(Vec::new())
        }

        fn find_copy_point(
            &self,
            _repository_root: &str,
            _url1: &str,
            _url2: &str,
        ) -> Result<Option<BranchCopyData>, ClientError> {
            self.scans.fetch_add(1, Ordering::Relaxed);
            Ok(self.answer.clone())
        }

        fn latest_revision(&self, _location: &str) -> Result<Revision, ClientError> {
            Ok(0)
        }
    }

    fn copy_data() -> BranchCopyData {
        BranchCopyData {
            source_url: "http://r/trunk".into(),
            source_revision: 8,
            target_url: "http://r/branches/x".into(),
            target_revision: 9,
        }
    }

    fn temp_store_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "svn-quick-merge-test-{name}-{}",
            std::process::id(),
        ))
    }

    fn open_cache(path: PathBuf, answer: Option<BranchCopyData>) -> (BranchPointCache, Arc<ScanHistory>) {
        let history = Arc::new(ScanHistory {
            answer,
            scans: AtomicUsize::new(0),
        });
        let cache = BranchPointCache::open(path, history.clone());
        (cache, history)
    }

    #[test]
    fn test_invert_roundtrip() {
        let data = copy_data();
        assert_eq!(data.invert().invert(), data);
        assert_eq!(data.invert().source_url, "http://r/branches/x");
    }

    #[test]
    fn test_get_true_orientation() {
        // Regardless of the side the fact was discovered from, get_true
        // yields merge-from as source.
        let plain = WrapperInvertor {
            inverted: false,
            wrapped: copy_data(),
        };
        assert_eq!(plain.get_true(), copy_data());

        let inverted = WrapperInvertor {
            inverted: true,
            wrapped: copy_data(),
        };
        assert_eq!(inverted.get_true(), copy_data().invert());
        assert_eq!(inverted.get_true().source_url, "http://r/branches/x");
        assert!(inverted.is_reintegrate());
    }

    #[test]
    fn test_longest_prefix_lookup() {
        let path = temp_store_path("prefix");
        let _ = std::fs::remove_file(&path);
        let (cache, history) = open_cache(path.clone(), Some(copy_data()));

        // Miss triggers a history scan and persists the result.
        let found = cache
            .compute_and_cache("http://r", "http://r/trunk", "http://r/branches/x")
            .unwrap();
        assert!(!found.inverted);
        assert_eq!(history.scans.load(Ordering::Relaxed), 1);

        // Any URL strictly under a cached branch path resolves without
        // another scan.
        let under = cache
            .get_copy_point(
                "http://r",
                "http://r/trunk/sub/dir",
                "http://r/branches/x/sub",
            )
            .unwrap();
        assert_eq!(under.get_true(), copy_data());
        assert_eq!(history.scans.load(Ordering::Relaxed), 1);

        // Discovered from the other side: polarity is inferred.
        let swapped = cache
            .get_copy_point("http://r", "http://r/branches/x", "http://r/trunk")
            .unwrap();
        assert!(swapped.inverted);
        assert_eq!(swapped.get_true().source_url, "http://r/branches/x");

        // A URL under no cached branch path does not resolve.
        assert!(
            cache
                .get_copy_point("http://r", "http://r/tags/v1", "http://r/branches/y")
                .is_none()
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_idempotent_persistence() {
        let path = temp_store_path("persist");
        let _ = std::fs::remove_file(&path);

        let (cache, _) = open_cache(path.clone(), Some(copy_data()));
        let first = cache
            .compute_and_cache("http://r", "http://r/trunk", "http://r/branches/x")
            .unwrap();

        // A fresh cache instance reads the persisted fact back without
        // scanning.
        let (reopened, history) = open_cache(path.clone(), Some(copy_data()));
        let second = reopened
            .get_copy_point("http://r", "http://r/trunk", "http://r/branches/x")
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(history.scans.load(Ordering::Relaxed), 0);

        // Recomputing and persisting again yields the same lookup result.
        let third = reopened
            .compute_and_cache("http://r", "http://r/trunk", "http://r/branches/x")
            .unwrap();
        assert_eq!(first, third);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_no_common_ancestor_is_not_an_error() {
        let path = temp_store_path("no-ancestor");
        let _ = std::fs::remove_file(&path);
        let (cache, history) = open_cache(path.clone(), None);
        assert!(
            cache
                .compute_and_cache("http://r", "http://r/trunk", "http://r/branches/x")
                .is_none()
        );
        assert_eq!(history.scans.load(Ordering::Relaxed), 1);
        let _ = std::fs::remove_file(&path);
    }
}
