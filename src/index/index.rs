//! # Generic Index
//!
//! One key→EntryIdSet tree with entry-limit semantics. Past the configured
//! limit a key's posting set is replaced by the undefined sentinel: the key
//! stops answering precise membership questions and searches on it must
//! fall back to full-candidate evaluation. Removing IDs from an undefined
//! key is a no-op; un-exceeding a limit would require a full recount,
//! which is deliberately not attempted.
//!
//! A posting set emptied by removal deletes its key outright; no tombstone
//! keys remain.

use super::id_set::{ConditionResult, EntryIdSet};
use crate::entry::EntryId;
use crate::storage::{TreeRead, TreeStore, WriteTxn};
use eyre::Result;

#[derive(Debug, Clone)]
pub struct Index {
    tree: String,
    entry_limit: usize,
}

impl Index {
    pub fn new(tree: String, entry_limit: usize) -> Index {
        Index { tree, entry_limit }
    }

    pub fn tree_name(&self) -> &str {
        &self.tree
    }

    pub fn entry_limit(&self) -> usize {
        self.entry_limit
    }

    pub fn open(&self, store: &TreeStore) {
        store.ensure_tree(&self.tree);
    }

    /// Idempotent insert inside a transaction. Crossing the entry limit
    /// degrades the key to the undefined sentinel.
    pub fn insert_id(&self, txn: &mut WriteTxn<'_>, key: &[u8], id: EntryId) -> Result<()> {
        let mut set = match txn.get_tree(&self.tree, key)? {
            Some(raw) => EntryIdSet::decode(&raw)?,
            None => EntryIdSet::new(),
        };
        if !set.is_defined() {
            return Ok(());
        }
        set.insert(id);
        if set.size().unwrap_or(0) > self.entry_limit {
            set = EntryIdSet::undefined();
        }
        txn.put(&self.tree, key.to_vec(), set.encode());
        Ok(())
    }

    /// Idempotent remove inside a transaction; no-op on undefined keys.
    pub fn remove_id(&self, txn: &mut WriteTxn<'_>, key: &[u8], id: EntryId) -> Result<()> {
        let Some(raw) = txn.get_tree(&self.tree, key)? else {
            return Ok(());
        };
        let mut set = EntryIdSet::decode(&raw)?;
        if !set.is_defined() {
            return Ok(());
        }
        if set.remove(id) {
            if set.is_empty() {
                txn.delete(&self.tree, key.to_vec());
            } else {
                txn.put(&self.tree, key.to_vec(), set.encode());
            }
        }
        Ok(())
    }

    pub fn contains_id(&self, r: &impl TreeRead, key: &[u8], id: EntryId) -> Result<ConditionResult> {
        match r.get_tree(&self.tree, key)? {
            None => Ok(ConditionResult::False),
            Some(raw) => Ok(EntryIdSet::decode(&raw)?.contains(id)),
        }
    }

    /// Posting set for one key; an absent key is the empty defined set.
    pub fn read_candidates(&self, r: &impl TreeRead, key: &[u8]) -> Result<EntryIdSet> {
        match r.get_tree(&self.tree, key)? {
            None => Ok(EntryIdSet::new()),
            Some(raw) => EntryIdSet::decode(&raw),
        }
    }

    /// Union of posting sets over a sorted key range (`None` bounds are
    /// open). Hitting any undefined key makes the whole range undefined.
    pub fn range_candidates(
        &self,
        r: &impl TreeRead,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        lower_inclusive: bool,
        upper_inclusive: bool,
    ) -> Result<EntryIdSet> {
        let scan = r.scan_tree(&self.tree, lower.unwrap_or(b""), None)?;
        let mut out = EntryIdSet::new();
        for (key, raw) in scan {
            if let Some(lo) = lower {
                if !lower_inclusive && key.as_slice() == lo {
                    continue;
                }
            }
            if let Some(hi) = upper {
                match key.as_slice().cmp(hi) {
                    std::cmp::Ordering::Greater => break,
                    std::cmp::Ordering::Equal if !upper_inclusive => break,
                    _ => {}
                }
            }
            let set = EntryIdSet::decode(&raw)?;
            if !set.is_defined() {
                return Ok(EntryIdSet::undefined());
            }
            out = out.union(&set);
        }
        Ok(out)
    }

    /// Number of keys currently in the undefined (over-limit) state.
    pub fn degraded_key_count(&self, r: &impl TreeRead) -> Result<usize> {
        let mut count = 0;
        for (_, raw) in r.scan_tree(&self.tree, b"", None)? {
            if !EntryIdSet::decode(&raw)?.is_defined() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Non-transactional posting write, for bulk import and rebuild paths
    /// running under the container's structural write lock.
    pub fn write_raw(&self, store: &TreeStore, key: &[u8], set: &EntryIdSet) -> Result<()> {
        store.put_raw(&self.tree, key.to_vec(), set.encode())
    }

    pub fn delete_tree(&self, store: &TreeStore) -> Result<()> {
        store.delete_tree(&self.tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn index(limit: usize) -> (tempfile::TempDir, TreeStore, Index) {
        let dir = tempdir().unwrap();
        let store = TreeStore::create(&dir.path().join("db")).unwrap();
        let idx = Index::new("t_cn.equality".to_string(), limit);
        idx.open(&store);
        (dir, store, idx)
    }

    #[test]
    fn insert_and_membership() {
        let (_d, store, idx) = index(10);
        let mut txn = store.begin_write();
        idx.insert_id(&mut txn, b"aaccf amar", EntryId(7)).unwrap();
        idx.insert_id(&mut txn, b"aaccf amar", EntryId(7)).unwrap();
        txn.commit().unwrap();

        assert_eq!(
            idx.contains_id(&store, b"aaccf amar", EntryId(7)).unwrap(),
            ConditionResult::True
        );
        assert_eq!(
            idx.contains_id(&store, b"aaccf amar", EntryId(8)).unwrap(),
            ConditionResult::False
        );
        assert_eq!(
            idx.read_candidates(&store, b"aaccf amar").unwrap().size(),
            Some(1)
        );
    }

    #[test]
    fn removal_deletes_empty_keys() {
        let (_d, store, idx) = index(10);
        let mut txn = store.begin_write();
        idx.insert_id(&mut txn, b"k", EntryId(1)).unwrap();
        txn.commit().unwrap();

        let mut txn = store.begin_write();
        idx.remove_id(&mut txn, b"k", EntryId(1)).unwrap();
        txn.commit().unwrap();

        assert!(store.get_tree("t_cn.equality", b"k").unwrap().is_none());
    }

    #[test]
    fn limit_degrades_key_to_undefined() {
        let (_d, store, idx) = index(3);
        let mut txn = store.begin_write();
        for i in 1..=4 {
            idx.insert_id(&mut txn, b"shared", EntryId(i)).unwrap();
        }
        txn.commit().unwrap();

        assert_eq!(
            idx.contains_id(&store, b"shared", EntryId(1)).unwrap(),
            ConditionResult::Undefined
        );
        assert!(!idx.read_candidates(&store, b"shared").unwrap().is_defined());
        assert_eq!(idx.degraded_key_count(&store).unwrap(), 1);

        // removal cannot un-exceed the limit
        let mut txn = store.begin_write();
        idx.remove_id(&mut txn, b"shared", EntryId(1)).unwrap();
        txn.commit().unwrap();
        assert_eq!(
            idx.contains_id(&store, b"shared", EntryId(2)).unwrap(),
            ConditionResult::Undefined
        );
    }

    #[test]
    fn range_candidates_union() {
        let (_d, store, idx) = index(10);
        let mut txn = store.begin_write();
        idx.insert_id(&mut txn, b"aaa", EntryId(1)).unwrap();
        idx.insert_id(&mut txn, b"bbb", EntryId(2)).unwrap();
        idx.insert_id(&mut txn, b"ccc", EntryId(3)).unwrap();
        txn.commit().unwrap();

        let set = idx
            .range_candidates(&store, Some(b"aaa"), Some(b"bbb"), false, true)
            .unwrap();
        let ids: Vec<u64> = set.iter().map(|i| i.as_u64()).collect();
        assert_eq!(ids, vec![2]);

        let set = idx
            .range_candidates(&store, Some(b"aaa"), None, true, false)
            .unwrap();
        assert_eq!(set.size(), Some(3));
    }
}
