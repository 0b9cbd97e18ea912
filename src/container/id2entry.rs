//! # ID-to-Entry Tree
//!
//! The primary entry store: 8-byte big-endian entry ID keys mapped to the
//! serialized entry record (see [`crate::entry`]). ID order equals key
//! order, so a full scan yields entries oldest-allocated first.

use crate::entry::{Entry, EntryId};
use crate::storage::{TreeRead, TreeStore, WriteTxn};
use eyre::Result;

pub struct Id2Entry {
    tree: String,
}

impl Id2Entry {
    pub fn new(prefix: &str) -> Id2Entry {
        Id2Entry {
            tree: format!("{}_id2entry", prefix),
        }
    }

    pub fn tree_name(&self) -> &str {
        &self.tree
    }

    pub fn open(&self, store: &TreeStore) {
        store.ensure_tree(&self.tree);
    }

    pub fn put(&self, txn: &mut WriteTxn<'_>, id: EntryId, entry: &Entry) {
        txn.put(&self.tree, id.key().to_vec(), entry.encode());
    }

    pub fn remove(&self, txn: &mut WriteTxn<'_>, id: EntryId) {
        txn.delete(&self.tree, id.key().to_vec());
    }

    pub fn get(&self, r: &impl TreeRead, id: EntryId) -> Result<Option<Entry>> {
        match r.get_tree(&self.tree, &id.key())? {
            None => Ok(None),
            Some(raw) => Ok(Some(Entry::decode(&raw)?)),
        }
    }

    pub fn count(&self, r: &impl TreeRead) -> Result<u64> {
        Ok(r.scan_tree(&self.tree, b"", None)?.len() as u64)
    }

    /// Every stored entry in ID order.
    pub fn scan_all(&self, r: &impl TreeRead) -> Result<Vec<(EntryId, Entry)>> {
        let mut out = Vec::new();
        for (key, raw) in r.scan_tree(&self.tree, b"", None)? {
            out.push((EntryId::from_key(&key)?, Entry::decode(&raw)?));
        }
        Ok(out)
    }
}
