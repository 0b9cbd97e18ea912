//! # Write Transactions
//!
//! A [`WriteTxn`] buffers its writes in a small-vector write set and applies
//! them atomically at commit. Holding the store's writer mutex for the whole
//! transaction gives the Single-Writer model; the apply lock (write mode,
//! taken only during the apply loop) keeps readers from observing a partial
//! commit.
//!
//! Reads inside the transaction see its own buffered writes overlaid on the
//! committed state. Dropping an uncommitted transaction discards the buffer;
//! nothing was applied, so there is nothing to undo.
//!
//! The write set is applied in sorted (tree, key) order with a stable sort,
//! so later writes to the same key win and the per-key touch order is
//! deterministic across transactions.

use super::{TreeRead, TreeStore};
use eyre::Result;
use parking_lot::MutexGuard;
use smallvec::SmallVec;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub(crate) struct WriteOp {
    tree: String,
    key: Vec<u8>,
    /// `None` deletes the key.
    value: Option<Vec<u8>>,
}

pub struct WriteTxn<'a> {
    store: &'a TreeStore,
    _writer: MutexGuard<'a, ()>,
    writes: SmallVec<[WriteOp; 16]>,
}

impl<'a> WriteTxn<'a> {
    pub(crate) fn new(store: &'a TreeStore) -> WriteTxn<'a> {
        WriteTxn {
            _writer: store.writer_lock.lock(),
            store,
            writes: SmallVec::new(),
        }
    }

    pub fn put(&mut self, tree: &str, key: Vec<u8>, value: Vec<u8>) {
        self.writes.push(WriteOp {
            tree: tree.to_string(),
            key,
            value: Some(value),
        });
    }

    pub fn delete(&mut self, tree: &str, key: Vec<u8>) {
        self.writes.push(WriteOp {
            tree: tree.to_string(),
            key,
            value: None,
        });
    }

    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    fn overlay_get(&self, tree: &str, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.writes
            .iter()
            .rev()
            .find(|op| op.tree == tree && op.key == key)
            .map(|op| op.value.clone())
    }

    pub fn commit(mut self) -> Result<()> {
        let mut writes = std::mem::take(&mut self.writes);
        writes.sort_by(|a, b| (a.tree.as_str(), &a.key).cmp(&(b.tree.as_str(), &b.key)));

        let _apply = self.store.apply_lock.write();
        let mut current: Option<(String, std::sync::Arc<super::Tree>)> = None;
        for op in writes {
            let tree = match &current {
                Some((name, tree)) if *name == op.tree => tree.clone(),
                _ => {
                    let tree = self.store.tree(&op.tree)?;
                    current = Some((op.tree.clone(), tree.clone()));
                    tree
                }
            };
            let mut map = tree.map.write();
            match op.value {
                Some(v) => {
                    map.insert(op.key, v);
                }
                None => {
                    map.remove(&op.key);
                }
            }
        }
        Ok(())
    }
}

impl TreeRead for WriteTxn<'_> {
    fn get_tree(&self, tree: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(overlay) = self.overlay_get(tree, key) {
            return Ok(overlay);
        }
        self.store.get_tree(tree, key)
    }

    fn scan_tree(
        &self,
        tree: &str,
        lower: &[u8],
        upper: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = self
            .store
            .scan_tree(tree, lower, upper)?
            .into_iter()
            .map(|(k, v)| (k, Some(v)))
            .collect();
        for op in &self.writes {
            if op.tree != tree {
                continue;
            }
            let in_range =
                op.key.as_slice() >= lower && upper.map(|u| op.key.as_slice() < u).unwrap_or(true);
            if in_range {
                merged.insert(op.key.clone(), op.value.clone());
            }
        }
        Ok(merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }
}
