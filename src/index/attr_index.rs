//! # Per-Attribute Index Group
//!
//! One [`AttributeIndex`] owns every index configured for a single
//! attribute type, at most one per key space: presence, equality (shared
//! with ordering), substring (chunk size in the identity), approximate.
//! Tree names follow `<container-prefix>_<attr>.<index_id>`.
//!
//! Entry changes flow through as key-set deltas: only keys that actually
//! appear or disappear are touched, so a value reorder or an untouched
//! attribute writes nothing.

use super::index::Index;
use super::indexer::{keys_for, IndexType};
use crate::config::IndexConfig;
use crate::entry::{Entry, EntryId};
use crate::storage::{TreeStore, WriteTxn};
use eyre::Result;
use hashbrown::HashMap;

pub struct AttributeIndex {
    attr: String,
    config: IndexConfig,
    /// index id → (representative type, index). Equality and ordering
    /// collapse onto one entry.
    indexes: HashMap<String, (IndexType, Index)>,
}

impl AttributeIndex {
    pub fn new(
        prefix: &str,
        attr: &str,
        config: IndexConfig,
        default_entry_limit: usize,
        store: &TreeStore,
    ) -> AttributeIndex {
        let attr = attr.to_ascii_lowercase();
        let limit = config.entry_limit.unwrap_or(default_entry_limit);
        let mut indexes = HashMap::new();
        for &ty in &config.types {
            let id = ty.index_id(config.substring_length);
            indexes.entry(id.clone()).or_insert_with(|| {
                let index = Index::new(format!("{}_{}.{}", prefix, attr, id), limit);
                index.open(store);
                (ty, index)
            });
        }
        AttributeIndex {
            attr,
            config,
            indexes,
        }
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn index_for(&self, ty: IndexType) -> Option<&Index> {
        if !self.config.types.contains(&ty) {
            return None;
        }
        self.indexes
            .get(&ty.index_id(self.config.substring_length))
            .map(|(_, index)| index)
    }

    pub fn index_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.indexes.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn entry_values<'e>(&self, entry: &'e Entry) -> &'e [String] {
        entry.attribute(&self.attr).unwrap_or(&[])
    }

    /// Inserts the entry's ID under every key every configured indexer
    /// derives from its values. No-op when the attribute is absent.
    pub fn add_entry(&self, txn: &mut WriteTxn<'_>, id: EntryId, entry: &Entry) -> Result<()> {
        let values = self.entry_values(entry);
        if values.is_empty() {
            return Ok(());
        }
        for (ty, index) in self.indexes.values() {
            for key in keys_for(*ty, values, self.config.substring_length) {
                index.insert_id(txn, &key, id)?;
            }
        }
        Ok(())
    }

    pub fn remove_entry(&self, txn: &mut WriteTxn<'_>, id: EntryId, entry: &Entry) -> Result<()> {
        let values = self.entry_values(entry);
        if values.is_empty() {
            return Ok(());
        }
        for (ty, index) in self.indexes.values() {
            for key in keys_for(*ty, values, self.config.substring_length) {
                index.remove_id(txn, &key, id)?;
            }
        }
        Ok(())
    }

    /// Key-set delta between the old and new state of the entry: keys only
    /// in the new state are inserted, keys only in the old state removed.
    pub fn modify_entry(
        &self,
        txn: &mut WriteTxn<'_>,
        id: EntryId,
        old: &Entry,
        new: &Entry,
    ) -> Result<()> {
        let old_values = self.entry_values(old);
        let new_values = self.entry_values(new);
        for (ty, index) in self.indexes.values() {
            let old_keys = keys_for(*ty, old_values, self.config.substring_length);
            let new_keys = keys_for(*ty, new_values, self.config.substring_length);
            for key in &new_keys {
                if old_keys.binary_search(key).is_err() {
                    index.insert_id(txn, key, id)?;
                }
            }
            for key in &old_keys {
                if new_keys.binary_search(key).is_err() {
                    index.remove_id(txn, key, id)?;
                }
            }
        }
        Ok(())
    }

    /// Repopulates the named per-type indexes from an entry stream, using
    /// the raw write path. Caller holds the container's structural write
    /// lock and has already created empty trees.
    pub fn rebuild_indexes<'a>(
        &self,
        store: &TreeStore,
        only_ids: &[String],
        entries: impl Iterator<Item = &'a (EntryId, Entry)>,
    ) -> Result<()> {
        let mut accum: HashMap<(String, Vec<u8>), super::id_set::EntryIdSet> = HashMap::new();
        for (id, entry) in entries {
            let values = self.entry_values(entry);
            if values.is_empty() {
                continue;
            }
            for (index_id, (ty, _)) in &self.indexes {
                if !only_ids.contains(index_id) {
                    continue;
                }
                for key in keys_for(*ty, values, self.config.substring_length) {
                    accum
                        .entry((index_id.clone(), key))
                        .or_default()
                        .insert(*id);
                }
            }
        }
        for ((index_id, key), mut set) in accum {
            let (_, index) = &self.indexes[&index_id];
            if set.size().unwrap_or(0) > index.entry_limit() {
                set = super::id_set::EntryIdSet::undefined();
            }
            index.write_raw(store, &key, &set)?;
        }
        Ok(())
    }

    /// Drops every tree owned by this attribute index.
    pub fn delete_all_trees(&self, store: &TreeStore) -> Result<()> {
        for (_, index) in self.indexes.values() {
            index.delete_tree(store)?;
        }
        Ok(())
    }
}
