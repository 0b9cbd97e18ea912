//! # Root Container
//!
//! Owns the store and one [`EntryContainer`] per configured base DN.
//! Requests are routed to the container with the longest base DN that the
//! target is subordinate to (or equal to), so nested bases behave the way
//! naming contexts do: `dc=sub,dc=test,dc=com` claims its own subtree out
//! of `dc=test,dc=com`.

use super::EntryContainer;
use crate::config::{BackendConfig, IndexConfig};
use crate::dn::Dn;
use crate::error::{OperationError, OpResult};
use crate::storage::TreeStore;
use eyre::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct RootContainer {
    store: Arc<TreeStore>,
    config: BackendConfig,
    /// normalized base DN → container
    containers: BTreeMap<String, Arc<EntryContainer>>,
}

impl RootContainer {
    /// Opens (creating if absent) the store and one container per base DN.
    pub fn open(config: BackendConfig) -> Result<RootContainer> {
        let store = Arc::new(TreeStore::open_or_create(&config.db_path)?);
        let mut containers = BTreeMap::new();
        for base in &config.base_dns {
            let base_dn = Dn::parse(base)?;
            let ec = EntryContainer::new(
                base_dn.clone(),
                store.clone(),
                &config.indexes,
                config.default_entry_limit,
            );
            containers.insert(base_dn.normalized(), Arc::new(ec));
        }
        Ok(RootContainer {
            store,
            config,
            containers,
        })
    }

    pub fn base_dns(&self) -> Vec<Dn> {
        self.containers
            .values()
            .map(|ec| ec.base_dn().clone())
            .collect()
    }

    /// The container whose base DN exactly equals `base`.
    pub fn container(&self, base: &Dn) -> OpResult<Arc<EntryContainer>> {
        self.containers
            .get(&base.normalized())
            .cloned()
            .ok_or_else(|| OperationError::NotABaseDn { dn: base.clone() })
    }

    /// Longest-match routing: the container whose base DN is the deepest
    /// one `dn` sits under.
    pub fn container_for_dn(&self, dn: &Dn) -> OpResult<Arc<EntryContainer>> {
        let mut best: Option<&Arc<EntryContainer>> = None;
        for ec in self.containers.values() {
            if dn.is_subordinate_or_equal(ec.base_dn()) {
                let deeper = best
                    .map(|b| ec.base_dn().num_components() > b.base_dn().num_components())
                    .unwrap_or(true);
                if deeper {
                    best = Some(ec);
                }
            }
        }
        best.cloned().ok_or_else(|| OperationError::NoSuchObject {
            dn: dn.clone(),
            matched_dn: None,
        })
    }

    /// Registers a new base DN, creating its (empty) trees.
    pub fn add_base_dn(&mut self, base: &Dn) -> OpResult<()> {
        let key = base.normalized();
        if self.containers.contains_key(&key) {
            return Err(OperationError::EntryAlreadyExists { dn: base.clone() });
        }
        let ec = EntryContainer::new(
            base.clone(),
            self.store.clone(),
            &self.config.indexes,
            self.config.default_entry_limit,
        );
        self.containers.insert(key, Arc::new(ec));
        Ok(())
    }

    /// Removes a base DN and every tree its container owns.
    pub fn remove_base_dn(&mut self, base: &Dn) -> OpResult<()> {
        let Some(ec) = self.containers.remove(&base.normalized()) else {
            return Err(OperationError::NotABaseDn { dn: base.clone() });
        };
        ec.delete_all_trees()
    }

    /// Applies (or with `None` removes) one attribute's index configuration
    /// in every container.
    pub fn apply_index_config(&self, attr: &str, config: Option<IndexConfig>) -> OpResult<()> {
        for ec in self.containers.values() {
            ec.apply_index_config(attr, config.clone())?;
        }
        Ok(())
    }

    /// Flushes every tree to disk.
    pub fn checkpoint(&self) -> OpResult<()> {
        Ok(self.store.checkpoint()?)
    }

    pub fn close(self) -> OpResult<()> {
        drop(self.containers);
        let store = Arc::try_unwrap(self.store)
            .map_err(|_| OperationError::ConstraintViolation(
                "backend still has live container references".to_string(),
            ))?;
        Ok(store.close()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::index::indexer::IndexType;
    use tempfile::tempdir;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn config(dir: &std::path::Path) -> BackendConfig {
        BackendConfig::builder()
            .db_path(dir.join("db"))
            .base_dn("dc=test,dc=com")
            .base_dn("dc=sub,dc=test,dc=com")
            .index("cn", IndexConfig::new([IndexType::Equality]))
            .build()
            .unwrap()
    }

    #[test]
    fn routing_prefers_the_deepest_base() {
        let dir = tempdir().unwrap();
        let root = RootContainer::open(config(dir.path())).unwrap();

        let outer = root
            .container_for_dn(&dn("uid=u,ou=People,dc=test,dc=com"))
            .unwrap();
        assert_eq!(outer.base_dn(), &dn("dc=test,dc=com"));

        let inner = root
            .container_for_dn(&dn("uid=u,dc=sub,dc=test,dc=com"))
            .unwrap();
        assert_eq!(inner.base_dn(), &dn("dc=sub,dc=test,dc=com"));

        assert!(root.container_for_dn(&dn("dc=elsewhere,dc=org")).is_err());
    }

    #[test]
    fn reopen_preserves_entries() {
        let dir = tempdir().unwrap();
        {
            let root = RootContainer::open(config(dir.path())).unwrap();
            let ec = root.container(&dn("dc=test,dc=com")).unwrap();
            ec.add_entry(
                &Entry::new(dn("dc=test,dc=com")).with_attribute("objectclass", vec!["domain"]),
            )
            .unwrap();
            drop(ec);
            root.close().unwrap();
        }
        let root = RootContainer::open(config(dir.path())).unwrap();
        let ec = root.container(&dn("dc=test,dc=com")).unwrap();
        assert_eq!(ec.entry_count().unwrap(), 1);
    }

    #[test]
    fn add_and_remove_base_dn() {
        let dir = tempdir().unwrap();
        let mut root = RootContainer::open(config(dir.path())).unwrap();
        root.add_base_dn(&dn("o=extra")).unwrap();
        assert!(root.container(&dn("o=extra")).is_ok());
        assert!(root.add_base_dn(&dn("o=extra")).is_err());

        root.remove_base_dn(&dn("o=extra")).unwrap();
        assert!(root.container(&dn("o=extra")).is_err());
        assert!(!root.store.tree_exists("o_extra_dn2id"));
    }
}
