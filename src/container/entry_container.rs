//! # Entry Container
//!
//! All trees belonging to one base DN, and the entry operations over them.
//! Every operation runs inside a single write transaction, so the primary
//! trees and every attribute index always move together; readers never see
//! an entry without its index postings or vice versa.
//!
//! ## Locking
//!
//! The container's `shared_lock` is a structural lock, not a data lock:
//! entry operations and searches take it in read mode and rely on the
//! store's Single-Writer transactions for data consistency. Bulk import
//! and index reconfiguration take it in write mode, excluding all entry
//! operations while trees are swapped or rebuilt.
//!
//! ## Entry IDs
//!
//! IDs are allocated from the container's meta tree inside the same
//! transaction that stores the entry, monotonically and never reused. A
//! parent is always added before its children and a rename renumbers the
//! whole moved subtree in DN order, so an ancestor's ID is always smaller
//! than every descendant's.

use super::dn2id::Dn2Id;
use super::dn2uri::Dn2Uri;
use super::id2entry::Id2Entry;
use crate::config::IndexConfig;
use crate::dn::Dn;
use crate::entry::{Entry, EntryId, Modification};
use crate::error::{OperationError, OpResult};
use crate::index::AttributeIndex;
use crate::search::{self, SearchRequest, SearchResult};
use crate::storage::{TreeRead, TreeStore, WriteTxn};
use eyre::{eyre, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) const NEXT_ID_KEY: &[u8] = b"next_entry_id";

pub struct EntryContainer {
    base_dn: Dn,
    prefix: String,
    store: Arc<TreeStore>,
    default_entry_limit: usize,
    pub(crate) shared_lock: RwLock<()>,
    dn2id: Dn2Id,
    id2entry: Id2Entry,
    dn2uri: Dn2Uri,
    meta_tree: String,
    attr_indexes: RwLock<BTreeMap<String, Arc<AttributeIndex>>>,
}

impl EntryContainer {
    pub fn new(
        base_dn: Dn,
        store: Arc<TreeStore>,
        indexes: &BTreeMap<String, IndexConfig>,
        default_entry_limit: usize,
    ) -> EntryContainer {
        let prefix = super::container_prefix(&base_dn);
        let dn2id = Dn2Id::new(&prefix);
        let id2entry = Id2Entry::new(&prefix);
        let dn2uri = Dn2Uri::new(&prefix);
        let meta_tree = format!("{}_meta", prefix);
        dn2id.open(&store);
        id2entry.open(&store);
        dn2uri.open(&store);
        store.ensure_tree(&meta_tree);

        let mut attr_indexes = BTreeMap::new();
        for (attr, config) in indexes {
            let ai = AttributeIndex::new(&prefix, attr, config.clone(), default_entry_limit, &store);
            attr_indexes.insert(ai.attr().to_string(), Arc::new(ai));
        }
        EntryContainer {
            base_dn,
            prefix,
            store,
            default_entry_limit,
            shared_lock: RwLock::new(()),
            dn2id,
            id2entry,
            dn2uri,
            meta_tree,
            attr_indexes: RwLock::new(attr_indexes),
        }
    }

    pub fn base_dn(&self) -> &Dn {
        &self.base_dn
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Read access to the container's underlying store.
    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub(crate) fn dn2id(&self) -> &Dn2Id {
        &self.dn2id
    }

    pub(crate) fn id2entry(&self) -> &Id2Entry {
        &self.id2entry
    }

    pub(crate) fn dn2uri(&self) -> &Dn2Uri {
        &self.dn2uri
    }

    pub fn attr_index(&self, attr: &str) -> Option<Arc<AttributeIndex>> {
        self.attr_indexes
            .read()
            .get(&attr.to_ascii_lowercase())
            .cloned()
    }

    pub fn indexed_attributes(&self) -> Vec<String> {
        self.attr_indexes.read().keys().cloned().collect()
    }

    /// Every tree this container owns, primary and index alike.
    pub fn all_tree_names(&self) -> Vec<String> {
        let mut names = vec![
            self.dn2id.tree_name().to_string(),
            self.id2entry.tree_name().to_string(),
            self.dn2uri.tree_name().to_string(),
            self.meta_tree.clone(),
        ];
        let indexes = self.attr_indexes.read();
        for ai in indexes.values() {
            for id in ai.index_ids() {
                names.push(format!("{}_{}.{}", self.prefix, ai.attr(), id));
            }
        }
        names.sort();
        names
    }

    pub(crate) fn allocate_id(&self, txn: &mut WriteTxn<'_>) -> Result<EntryId> {
        let next = match txn.get_tree(&self.meta_tree, NEXT_ID_KEY)? {
            Some(raw) => {
                let be: [u8; 8] = raw
                    .try_into()
                    .map_err(|_| eyre!("next-ID record is not 8 bytes"))?;
                u64::from_be_bytes(be)
            }
            None => 1,
        };
        txn.put(
            &self.meta_tree,
            NEXT_ID_KEY.to_vec(),
            (next + 1).to_be_bytes().to_vec(),
        );
        Ok(EntryId(next))
    }

    fn index_add(&self, txn: &mut WriteTxn<'_>, id: EntryId, entry: &Entry) -> Result<()> {
        let indexes = self.attr_indexes.read();
        for ai in indexes.values() {
            ai.add_entry(txn, id, entry)?;
        }
        Ok(())
    }

    fn index_remove(&self, txn: &mut WriteTxn<'_>, id: EntryId, entry: &Entry) -> Result<()> {
        let indexes = self.attr_indexes.read();
        for ai in indexes.values() {
            ai.remove_entry(txn, id, entry)?;
        }
        Ok(())
    }

    fn index_modify(
        &self,
        txn: &mut WriteTxn<'_>,
        id: EntryId,
        old: &Entry,
        new: &Entry,
    ) -> Result<()> {
        let indexes = self.attr_indexes.read();
        for ai in indexes.values() {
            ai.modify_entry(txn, id, old, new)?;
        }
        Ok(())
    }

    fn stored_entry(&self, r: &impl TreeRead, id: EntryId) -> Result<Entry> {
        self.id2entry
            .get(r, id)?
            .ok_or_else(|| eyre!("entry ID {} is in dn2id but not id2entry", id))
    }

    /// Adds one entry. The parent must already exist (except for the base
    /// entry itself); the new ID is allocated inside the same transaction
    /// that stores the entry.
    pub fn add_entry(&self, entry: &Entry) -> OpResult<EntryId> {
        let _shared = self.shared_lock.read();
        self.add_entry_unlocked(entry)
    }

    /// Add path without the structural lock, for callers already holding
    /// it (bulk import).
    pub(crate) fn add_entry_unlocked(&self, entry: &Entry) -> OpResult<EntryId> {
        let dn = entry.dn();
        if !dn.is_subordinate_or_equal(&self.base_dn) {
            return Err(OperationError::ConstraintViolation(format!(
                "{} is not within base DN {}",
                dn, self.base_dn
            )));
        }
        let mut txn = self.store.begin_write();
        if self.dn2id.get(&txn, dn)?.is_some() {
            return Err(OperationError::EntryAlreadyExists { dn: dn.clone() });
        }
        if *dn != self.base_dn {
            let parent = dn.parent().ok_or_else(|| eyre!("non-base DN has no parent"))?;
            if self.dn2id.get(&txn, &parent)?.is_none() {
                let matched_dn = self.dn2id.matched_dn(&txn, dn, &self.base_dn)?;
                return Err(OperationError::NoSuchParent {
                    dn: dn.clone(),
                    matched_dn,
                });
            }
        }
        let id = self.allocate_id(&mut txn)?;
        self.dn2id.put(&mut txn, dn, id);
        self.id2entry.put(&mut txn, id, entry);
        if entry.is_referral() {
            self.dn2uri.update_for(&mut txn, entry);
        }
        self.index_add(&mut txn, id, entry)?;
        txn.commit()?;
        Ok(id)
    }

    pub fn entry_exists(&self, dn: &Dn) -> OpResult<bool> {
        let _shared = self.shared_lock.read();
        Ok(self.dn2id.get(&*self.store, dn)?.is_some())
    }

    pub fn get_entry_id(&self, dn: &Dn) -> OpResult<Option<EntryId>> {
        let _shared = self.shared_lock.read();
        Ok(self.dn2id.get(&*self.store, dn)?)
    }

    pub fn get_entry(&self, dn: &Dn) -> OpResult<Option<Entry>> {
        let _shared = self.shared_lock.read();
        match self.dn2id.get(&*self.store, dn)? {
            None => Ok(None),
            Some(id) => Ok(Some(self.stored_entry(&*self.store, id)?)),
        }
    }

    /// Deletes an entry, or a whole subtree when `subtree` is set. A leaf
    /// delete of an entry with children fails. The optional cancel flag is
    /// checked between entries; cancellation aborts the transaction, so
    /// nothing is applied. Returns the number of entries deleted.
    pub fn delete_entry(
        &self,
        dn: &Dn,
        subtree: bool,
        cancel: Option<&AtomicBool>,
    ) -> OpResult<usize> {
        let _shared = self.shared_lock.read();
        let mut txn = self.store.begin_write();
        let Some(target_id) = self.dn2id.get(&txn, dn)? else {
            let matched_dn = self.dn2id.matched_dn(&txn, dn, &self.base_dn)?;
            return Err(OperationError::NoSuchObject {
                dn: dn.clone(),
                matched_dn,
            });
        };
        let descendants = self.dn2id.subtree(&txn, dn)?;
        if !subtree && !descendants.is_empty() {
            return Err(OperationError::NotAllowedOnNonLeaf { dn: dn.clone() });
        }
        let mut ids = vec![target_id];
        ids.extend(descendants.iter().map(|(_, id)| *id));

        let mut count = 0;
        for id in ids {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(OperationError::Cancelled);
                }
            }
            let entry = self.stored_entry(&txn, id)?;
            self.dn2id.remove(&mut txn, entry.dn());
            self.id2entry.remove(&mut txn, id);
            if entry.is_referral() {
                self.dn2uri.remove(&mut txn, entry.dn());
            }
            self.index_remove(&mut txn, id, &entry)?;
            count += 1;
        }
        txn.commit()?;
        Ok(count)
    }

    /// Replaces the entry stored at `new.dn()` in place, keeping its ID.
    /// Index postings are updated by key-set delta.
    pub fn replace_entry(&self, new: &Entry) -> OpResult<()> {
        let _shared = self.shared_lock.read();
        self.replace_entry_unlocked(new)
    }

    pub(crate) fn replace_entry_unlocked(&self, new: &Entry) -> OpResult<()> {
        let mut txn = self.store.begin_write();
        let Some(id) = self.dn2id.get(&txn, new.dn())? else {
            let matched_dn = self.dn2id.matched_dn(&txn, new.dn(), &self.base_dn)?;
            return Err(OperationError::NoSuchObject {
                dn: new.dn().clone(),
                matched_dn,
            });
        };
        let old = self.stored_entry(&txn, id)?;
        self.id2entry.put(&mut txn, id, new);
        if old.is_referral() || new.is_referral() {
            self.dn2uri.update_for(&mut txn, new);
        }
        self.index_modify(&mut txn, id, &old, new)?;
        txn.commit()?;
        Ok(())
    }

    /// Applies a modification list to the stored entry and writes the
    /// result back. Fails atomically: a bad modification changes nothing.
    pub fn modify_entry(&self, dn: &Dn, mods: &[Modification]) -> OpResult<Entry> {
        let _shared = self.shared_lock.read();
        let mut txn = self.store.begin_write();
        let Some(id) = self.dn2id.get(&txn, dn)? else {
            let matched_dn = self.dn2id.matched_dn(&txn, dn, &self.base_dn)?;
            return Err(OperationError::NoSuchObject {
                dn: dn.clone(),
                matched_dn,
            });
        };
        let old = self.stored_entry(&txn, id)?;
        let new = old.apply_modifications(mods)?;
        self.id2entry.put(&mut txn, id, &new);
        if old.is_referral() || new.is_referral() {
            self.dn2uri.update_for(&mut txn, &new);
        }
        self.index_modify(&mut txn, id, &old, &new)?;
        txn.commit()?;
        Ok(new)
    }

    /// Moves `old_dn` (and its whole subtree) to `new_dn`. Every moved
    /// entry gets a fresh ID, allocated in DN order, so ancestor IDs stay
    /// smaller than descendant IDs without any fixup pass. The new RDN
    /// value is added to the entry's attributes if not already present.
    pub fn rename_entry(&self, old_dn: &Dn, new_dn: &Dn) -> OpResult<()> {
        let _shared = self.shared_lock.read();
        if *old_dn == self.base_dn {
            return Err(OperationError::ConstraintViolation(format!(
                "cannot rename the base entry {}",
                old_dn
            )));
        }
        if !new_dn.is_subordinate_or_equal(&self.base_dn) {
            return Err(OperationError::ConstraintViolation(format!(
                "{} is not within base DN {}",
                new_dn, self.base_dn
            )));
        }
        if new_dn.is_subordinate_or_equal(old_dn) {
            return Err(OperationError::ConstraintViolation(format!(
                "cannot move {} under itself",
                old_dn
            )));
        }

        let mut txn = self.store.begin_write();
        let Some(target_id) = self.dn2id.get(&txn, old_dn)? else {
            let matched_dn = self.dn2id.matched_dn(&txn, old_dn, &self.base_dn)?;
            return Err(OperationError::NoSuchObject {
                dn: old_dn.clone(),
                matched_dn,
            });
        };
        if self.dn2id.get(&txn, new_dn)?.is_some() {
            return Err(OperationError::EntryAlreadyExists { dn: new_dn.clone() });
        }
        let new_parent = new_dn
            .parent()
            .ok_or_else(|| eyre!("rename target has no parent"))?;
        if self.dn2id.get(&txn, &new_parent)?.is_none() {
            let matched_dn = self.dn2id.matched_dn(&txn, new_dn, &self.base_dn)?;
            return Err(OperationError::NoSuchParent {
                dn: new_dn.clone(),
                matched_dn,
            });
        }

        // DN-key order: the moved entry first, then descendants with every
        // ancestor before its children.
        let mut old_ids = vec![target_id];
        old_ids.extend(self.dn2id.subtree(&txn, old_dn)?.iter().map(|(_, id)| *id));

        for old_id in old_ids {
            let mut entry = self.stored_entry(&txn, old_id)?;
            let moved_dn = entry.dn().rebase(old_dn, new_dn)?;
            self.dn2id.remove(&mut txn, entry.dn());
            self.id2entry.remove(&mut txn, old_id);
            if entry.is_referral() {
                self.dn2uri.remove(&mut txn, entry.dn());
            }
            self.index_remove(&mut txn, old_id, &entry)?;

            entry = entry.with_dn(moved_dn);
            if old_id == target_id {
                if let Some(rdn) = new_dn.rdn() {
                    if !entry.has_value(rdn.attr(), rdn.value()) {
                        entry = entry.with_attribute(rdn.attr(), vec![rdn.value()]);
                    }
                }
            }
            let new_id = self.allocate_id(&mut txn)?;
            self.dn2id.put(&mut txn, entry.dn(), new_id);
            self.id2entry.put(&mut txn, new_id, &entry);
            if entry.is_referral() {
                self.dn2uri.update_for(&mut txn, &entry);
            }
            self.index_add(&mut txn, new_id, &entry)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Number of immediate children, or -1 when the entry does not exist.
    pub fn get_number_of_children(&self, dn: &Dn) -> OpResult<i64> {
        let _shared = self.shared_lock.read();
        if self.dn2id.get(&*self.store, dn)?.is_none() {
            return Ok(-1);
        }
        Ok(self.dn2id.children(&*self.store, dn)?.len() as i64)
    }

    /// Total number of entries in the container. `dn` must be exactly the
    /// container's base DN.
    pub fn get_number_of_entries_in_base_dn(&self, dn: &Dn) -> OpResult<u64> {
        let _shared = self.shared_lock.read();
        if *dn != self.base_dn {
            return Err(OperationError::NotABaseDn { dn: dn.clone() });
        }
        Ok(self.id2entry.count(&*self.store)?)
    }

    pub fn entry_count(&self) -> OpResult<u64> {
        let _shared = self.shared_lock.read();
        Ok(self.id2entry.count(&*self.store)?)
    }

    pub fn search(&self, request: &SearchRequest) -> OpResult<SearchResult> {
        let _shared = self.shared_lock.read();
        search::execute(self, request)
    }

    /// Reconfigures (or with `None` removes) the index group of one
    /// attribute, rebuilding only per-type indexes that do not exist yet
    /// and dropping the ones the new configuration no longer names. Runs
    /// under the structural write lock, so no entry operation interleaves
    /// with the rebuild.
    pub fn apply_index_config(&self, attr: &str, config: Option<IndexConfig>) -> OpResult<()> {
        let _shared = self.shared_lock.write();
        let attr = attr.to_ascii_lowercase();
        let mut indexes = self.attr_indexes.write();
        let old_ids = indexes
            .get(&attr)
            .map(|ai| ai.index_ids())
            .unwrap_or_default();

        let Some(config) = config else {
            if let Some(old) = indexes.remove(&attr) {
                old.delete_all_trees(&self.store)?;
            }
            return Ok(());
        };
        if config.types.is_empty() {
            return Err(OperationError::ConfigurationError(format!(
                "index for '{}' configures no index types",
                attr
            )));
        }

        let new_ai = AttributeIndex::new(
            &self.prefix,
            &attr,
            config,
            self.default_entry_limit,
            &self.store,
        );
        let new_ids = new_ai.index_ids();
        let to_build: Vec<String> = new_ids
            .iter()
            .filter(|id| !old_ids.contains(id))
            .cloned()
            .collect();
        for id in old_ids.iter().filter(|id| !new_ids.contains(id)) {
            self.store
                .delete_tree(&format!("{}_{}.{}", self.prefix, attr, id))?;
        }
        if !to_build.is_empty() {
            for id in &to_build {
                self.store
                    .clear_tree(&format!("{}_{}.{}", self.prefix, attr, id))?;
            }
            let entries = self.id2entry.scan_all(&*self.store)?;
            new_ai.rebuild_indexes(&self.store, &to_build, entries.iter())?;
        }
        indexes.insert(attr, Arc::new(new_ai));
        Ok(())
    }

    /// Drops every tree the container owns. Used when a base DN is removed
    /// from the backend.
    pub fn delete_all_trees(&self) -> OpResult<()> {
        let _shared = self.shared_lock.write();
        for name in [
            self.dn2id.tree_name(),
            self.id2entry.tree_name(),
            self.dn2uri.tree_name(),
            self.meta_tree.as_str(),
        ] {
            self.store.delete_tree(name)?;
        }
        let indexes = self.attr_indexes.read();
        for ai in indexes.values() {
            ai.delete_all_trees(&self.store)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::indexer::IndexType;
    use crate::index::ConditionResult;
    use tempfile::tempdir;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn container() -> (tempfile::TempDir, EntryContainer) {
        let dir = tempdir().unwrap();
        let store = Arc::new(TreeStore::create(&dir.path().join("db")).unwrap());
        let mut indexes = BTreeMap::new();
        indexes.insert(
            "cn".to_string(),
            IndexConfig::new([
                IndexType::Presence,
                IndexType::Equality,
                IndexType::Substring,
            ]),
        );
        indexes.insert(
            "uid".to_string(),
            IndexConfig::new([IndexType::Equality]),
        );
        let ec = EntryContainer::new(dn("dc=test,dc=com"), store, &indexes, 4000);
        (dir, ec)
    }

    fn org(dn_str: &str) -> Entry {
        Entry::new(dn(dn_str)).with_attribute("objectclass", vec!["top", "organizationalUnit"])
    }

    fn person(dn_str: &str, cn: &str) -> Entry {
        let uid = dn(dn_str).rdn().unwrap().value().to_string();
        Entry::new(dn(dn_str))
            .with_attribute("objectclass", vec!["top", "person"])
            .with_attribute("cn", vec![cn])
            .with_attribute("uid", vec![uid.as_str()])
    }

    fn seed(ec: &EntryContainer) {
        ec.add_entry(&Entry::new(dn("dc=test,dc=com")).with_attribute("objectclass", vec!["domain"]))
            .unwrap();
        ec.add_entry(&org("ou=People,dc=test,dc=com")).unwrap();
        ec.add_entry(&person("uid=user.0,ou=People,dc=test,dc=com", "Aaccf Amar"))
            .unwrap();
        ec.add_entry(&person(
            "uid=user.539,ou=People,dc=test,dc=com",
            "Ardyth Bainton",
        ))
        .unwrap();
    }

    #[test]
    fn add_and_get_round_trip() {
        let (_d, ec) = container();
        seed(&ec);
        let got = ec
            .get_entry(&dn("uid=user.0,ou=People,dc=test,dc=com"))
            .unwrap()
            .unwrap();
        assert_eq!(got.attribute("cn").unwrap(), &["Aaccf Amar"]);
        assert!(ec.get_entry(&dn("uid=nobody,dc=test,dc=com")).unwrap().is_none());
    }

    #[test]
    fn ids_are_monotonic_and_parent_smaller() {
        let (_d, ec) = container();
        seed(&ec);
        let base = ec.get_entry_id(&dn("dc=test,dc=com")).unwrap().unwrap();
        let people = ec
            .get_entry_id(&dn("ou=People,dc=test,dc=com"))
            .unwrap()
            .unwrap();
        let user = ec
            .get_entry_id(&dn("uid=user.0,ou=People,dc=test,dc=com"))
            .unwrap()
            .unwrap();
        assert!(base < people && people < user);
    }

    #[test]
    fn duplicate_add_fails() {
        let (_d, ec) = container();
        seed(&ec);
        let err = ec.add_entry(&org("ou=People,dc=test,dc=com")).unwrap_err();
        assert!(matches!(err, OperationError::EntryAlreadyExists { .. }));
    }

    #[test]
    fn missing_parent_reports_matched_dn() {
        let (_d, ec) = container();
        seed(&ec);
        let err = ec
            .add_entry(&person("uid=u,ou=Missing,ou=People,dc=test,dc=com", "X"))
            .unwrap_err();
        let OperationError::NoSuchParent { matched_dn, .. } = err else {
            panic!("expected NoSuchParent, got {:?}", err);
        };
        assert_eq!(matched_dn, Some(dn("ou=People,dc=test,dc=com")));
    }

    #[test]
    fn leaf_delete_refuses_children() {
        let (_d, ec) = container();
        seed(&ec);
        let err = ec
            .delete_entry(&dn("ou=People,dc=test,dc=com"), false, None)
            .unwrap_err();
        assert!(matches!(err, OperationError::NotAllowedOnNonLeaf { .. }));
    }

    #[test]
    fn subtree_delete_removes_everything_and_postings() {
        let (_d, ec) = container();
        seed(&ec);
        let deleted = ec
            .delete_entry(&dn("ou=People,dc=test,dc=com"), true, None)
            .unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(ec.entry_count().unwrap(), 1);

        let cn_eq = ec
            .attr_index("cn")
            .unwrap()
            .index_for(IndexType::Equality)
            .unwrap()
            .read_candidates(ec.store(), b"aaccf amar")
            .unwrap();
        assert!(cn_eq.is_empty(), "deleted entry left equality postings behind");
    }

    #[test]
    fn cancelled_delete_applies_nothing() {
        let (_d, ec) = container();
        seed(&ec);
        let cancel = AtomicBool::new(true);
        let err = ec
            .delete_entry(&dn("ou=People,dc=test,dc=com"), true, Some(&cancel))
            .unwrap_err();
        assert!(matches!(err, OperationError::Cancelled));
        assert_eq!(ec.entry_count().unwrap(), 4, "cancelled delete must not apply");
    }

    #[test]
    fn modify_updates_index_postings() {
        let (_d, ec) = container();
        seed(&ec);
        let target = dn("uid=user.0,ou=People,dc=test,dc=com");
        let id = ec.get_entry_id(&target).unwrap().unwrap();
        ec.modify_entry(&target, &[Modification::replace("cn", &["New Name"])])
            .unwrap();

        let eq = ec.attr_index("cn").unwrap();
        let eq = eq.index_for(IndexType::Equality).unwrap();
        assert_eq!(
            eq.contains_id(ec.store(), b"aaccf amar", id).unwrap(),
            ConditionResult::False
        );
        assert_eq!(
            eq.contains_id(ec.store(), b"new name", id).unwrap(),
            ConditionResult::True
        );
    }

    #[test]
    fn rename_renumbers_subtree_in_dn_order() {
        let (_d, ec) = container();
        seed(&ec);
        ec.add_entry(&org("ou=JEB Testers,dc=test,dc=com")).unwrap();
        let max_before = ec
            .get_entry_id(&dn("ou=JEB Testers,dc=test,dc=com"))
            .unwrap()
            .unwrap();

        ec.rename_entry(
            &dn("ou=People,dc=test,dc=com"),
            &dn("ou=Good People,ou=JEB Testers,dc=test,dc=com"),
        )
        .unwrap();

        assert!(ec.get_entry(&dn("ou=People,dc=test,dc=com")).unwrap().is_none());
        let moved = ec
            .get_entry(&dn("ou=Good People,ou=JEB Testers,dc=test,dc=com"))
            .unwrap()
            .unwrap();
        assert!(moved.has_value("ou", "Good People"));

        let parent_id = ec
            .get_entry_id(&dn("ou=Good People,ou=JEB Testers,dc=test,dc=com"))
            .unwrap()
            .unwrap();
        let child_id = ec
            .get_entry_id(&dn(
                "uid=user.0,ou=Good People,ou=JEB Testers,dc=test,dc=com",
            ))
            .unwrap()
            .unwrap();
        assert!(max_before < parent_id, "moved entries get fresh IDs");
        assert!(parent_id < child_id, "ancestor ID must stay below descendant ID");
    }

    #[test]
    fn rename_under_itself_is_rejected() {
        let (_d, ec) = container();
        seed(&ec);
        let err = ec
            .rename_entry(
                &dn("ou=People,dc=test,dc=com"),
                &dn("ou=Inner,ou=People,dc=test,dc=com"),
            )
            .unwrap_err();
        assert!(matches!(err, OperationError::ConstraintViolation(_)));
    }

    #[test]
    fn child_and_base_counts() {
        let (_d, ec) = container();
        seed(&ec);
        assert_eq!(
            ec.get_number_of_children(&dn("ou=People,dc=test,dc=com")).unwrap(),
            2
        );
        assert_eq!(
            ec.get_number_of_children(&dn("ou=Nope,dc=test,dc=com")).unwrap(),
            -1
        );
        assert_eq!(
            ec.get_number_of_entries_in_base_dn(&dn("dc=test,dc=com")).unwrap(),
            4
        );
        let err = ec
            .get_number_of_entries_in_base_dn(&dn("ou=People,dc=test,dc=com"))
            .unwrap_err();
        assert!(matches!(err, OperationError::NotABaseDn { .. }));
    }

    #[test]
    fn index_reconfiguration_rebuilds_new_trees() {
        let (_d, ec) = container();
        seed(&ec);
        // sn was never indexed; add an equality index and check it sees
        // entries added before the reconfiguration
        ec.apply_index_config(
            "sn",
            Some(IndexConfig::new([IndexType::Equality, IndexType::Presence])),
        )
        .unwrap();
        let target = dn("uid=user.99,ou=People,dc=test,dc=com");
        ec.add_entry(
            &person("uid=user.99,ou=People,dc=test,dc=com", "Test Person")
                .with_attribute("sn", vec!["Person"]),
        )
        .unwrap();
        let id = ec.get_entry_id(&target).unwrap().unwrap();

        let sn = ec.attr_index("sn").unwrap();
        let eq = sn.index_for(IndexType::Equality).unwrap();
        assert_eq!(
            eq.contains_id(ec.store(), b"person", id).unwrap(),
            ConditionResult::True
        );

        ec.apply_index_config("sn", None).unwrap();
        assert!(ec.attr_index("sn").is_none());
        assert!(!ec.store().tree_exists("dc_test_dc_com_sn.equality"));
    }
}
