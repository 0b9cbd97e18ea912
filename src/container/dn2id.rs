//! # DN-to-ID Tree
//!
//! Maps DN keys to entry IDs. The key encoding (see [`crate::dn`]) stores
//! a subtree as one contiguous key range, so subtree and one-level scans
//! are range scans rather than tree walks. Values are the 8-byte
//! big-endian entry ID.

use crate::dn::{key_components, Dn};
use crate::entry::EntryId;
use crate::storage::{TreeRead, TreeStore, WriteTxn};
use eyre::Result;

pub struct Dn2Id {
    tree: String,
}

impl Dn2Id {
    pub fn new(prefix: &str) -> Dn2Id {
        Dn2Id {
            tree: format!("{}_dn2id", prefix),
        }
    }

    pub fn tree_name(&self) -> &str {
        &self.tree
    }

    pub fn open(&self, store: &TreeStore) {
        store.ensure_tree(&self.tree);
    }

    pub fn put(&self, txn: &mut WriteTxn<'_>, dn: &Dn, id: EntryId) {
        txn.put(&self.tree, dn.key(), id.key().to_vec());
    }

    pub fn remove(&self, txn: &mut WriteTxn<'_>, dn: &Dn) {
        txn.delete(&self.tree, dn.key());
    }

    pub fn get(&self, r: &impl TreeRead, dn: &Dn) -> Result<Option<EntryId>> {
        match r.get_tree(&self.tree, &dn.key())? {
            None => Ok(None),
            Some(raw) => Ok(Some(EntryId::from_key(&raw)?)),
        }
    }

    /// Strict descendants of `base`, in DN key order (every ancestor before
    /// its descendants).
    pub fn subtree(&self, r: &impl TreeRead, base: &Dn) -> Result<Vec<(Vec<u8>, EntryId)>> {
        let (lower, upper) = base.subtree_range();
        let mut out = Vec::new();
        for (key, raw) in r.scan_tree(&self.tree, &lower, Some(&upper))? {
            out.push((key, EntryId::from_key(&raw)?));
        }
        Ok(out)
    }

    /// Immediate children of `parent`: subtree keys with exactly one more
    /// DN component.
    pub fn children(&self, r: &impl TreeRead, parent: &Dn) -> Result<Vec<EntryId>> {
        let want = parent.num_components() + 1;
        let mut out = Vec::new();
        for (key, id) in self.subtree(r, parent)? {
            if key_components(&key) == want {
                out.push(id);
            }
        }
        Ok(out)
    }

    /// Nearest existing ancestor of `dn`, for not-found diagnostics. Only
    /// ancestors at or below `base` are considered.
    pub fn matched_dn(&self, r: &impl TreeRead, dn: &Dn, base: &Dn) -> Result<Option<Dn>> {
        for ancestor in dn.ancestors() {
            if !ancestor.is_subordinate_or_equal(base) {
                break;
            }
            if self.get(r, &ancestor)?.is_some() {
                return Ok(Some(ancestor));
            }
        }
        Ok(None)
    }
}
