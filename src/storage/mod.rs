//! # Transactional Tree Store
//!
//! The engine's private transactional key-value layer: a set of named
//! ordered trees with single-writer transactions and checkpoint-based
//! durability.
//!
//! ## Concurrency Model
//!
//! Single-Writer / Multi-Reader:
//!
//! - `writer_lock`: held for the whole lifetime of a [`WriteTxn`]. Exactly
//!   one write transaction exists at a time; begin blocks behind it.
//! - `apply_lock`: a RwLock taken in write mode only while a commit applies
//!   its buffered write set (or a bulk write lands), and in read mode by
//!   every read. A reader therefore never observes a half-applied commit,
//!   even one spanning primary and index trees.
//! - per-tree `RwLock<BTreeMap>`: protects individual tree maps.
//!
//! Lock order is always `writer_lock` → `apply_lock` → tree lock. Write
//! sets are applied in sorted (tree, key) order, which keeps the key-lock
//! acquisition order deterministic.
//!
//! ## Durability
//!
//! `checkpoint()` serializes every tree to `<dir>/<n>.tree` (CRC64-guarded,
//! see [`persist`]) with a write-to-temp-then-rename step, and `open()`
//! reloads and validates them. A checksum mismatch or I/O failure is a hard
//! error; this layer never retries.

pub mod persist;
pub mod txn;

pub use txn::WriteTxn;

use eyre::{bail, Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const META_FILE: &str = "dirstore.meta";
const META_MAGIC: &[u8] = b"DSTORE1\n";

pub(crate) type TreeMap = BTreeMap<Vec<u8>, Vec<u8>>;

pub(crate) struct Tree {
    pub(crate) map: RwLock<TreeMap>,
}

impl Tree {
    fn new(map: TreeMap) -> Arc<Tree> {
        Arc::new(Tree {
            map: RwLock::new(map),
        })
    }
}

/// Uniform read access for code that runs both inside and outside a write
/// transaction (inside, reads see the transaction's own buffered writes).
pub trait TreeRead {
    fn get_tree(&self, tree: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Ordered scan of `[lower, upper)`; `None` upper bound scans to the end.
    fn scan_tree(
        &self,
        tree: &str,
        lower: &[u8],
        upper: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

pub struct TreeStore {
    dir: PathBuf,
    trees: RwLock<HashMap<String, Arc<Tree>>>,
    pub(crate) writer_lock: Mutex<()>,
    pub(crate) apply_lock: RwLock<()>,
}

impl TreeStore {
    /// Creates a new store directory. Fails if one already exists there.
    pub fn create(dir: &Path) -> Result<TreeStore> {
        let meta = dir.join(META_FILE);
        if meta.exists() {
            bail!("store already exists at {}", dir.display());
        }
        fs::create_dir_all(dir)
            .wrap_err_with(|| format!("failed to create store directory {}", dir.display()))?;
        fs::write(&meta, META_MAGIC)
            .wrap_err_with(|| format!("failed to write {}", meta.display()))?;
        Ok(TreeStore {
            dir: dir.to_path_buf(),
            trees: RwLock::new(HashMap::new()),
            writer_lock: Mutex::new(()),
            apply_lock: RwLock::new(()),
        })
    }

    /// Opens an existing store, loading and checksum-validating every tree
    /// snapshot.
    pub fn open(dir: &Path) -> Result<TreeStore> {
        let meta = dir.join(META_FILE);
        let contents =
            fs::read(&meta).wrap_err_with(|| format!("failed to read {}", meta.display()))?;
        if contents != META_MAGIC {
            bail!("{} is not a dirstore directory", dir.display());
        }
        let mut trees = HashMap::new();
        for entry in
            fs::read_dir(dir).wrap_err_with(|| format!("failed to list {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tree") {
                continue;
            }
            let (name, map) = persist::load_tree(&path)
                .wrap_err_with(|| format!("failed to load {}", path.display()))?;
            trees.insert(name, Tree::new(map));
        }
        Ok(TreeStore {
            dir: dir.to_path_buf(),
            trees: RwLock::new(trees),
            writer_lock: Mutex::new(()),
            apply_lock: RwLock::new(()),
        })
    }

    /// Opens the store at `dir`, creating it if absent.
    pub fn open_or_create(dir: &Path) -> Result<TreeStore> {
        if dir.join(META_FILE).exists() {
            TreeStore::open(dir)
        } else {
            TreeStore::create(dir)
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn begin_write(&self) -> WriteTxn<'_> {
        WriteTxn::new(self)
    }

    pub fn tree_exists(&self, name: &str) -> bool {
        self.trees.read().contains_key(name)
    }

    pub fn tree_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.trees.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Creates the named tree if it does not exist yet.
    pub fn ensure_tree(&self, name: &str) {
        let mut trees = self.trees.write();
        trees
            .entry(name.to_string())
            .or_insert_with(|| Tree::new(TreeMap::new()));
    }

    pub fn delete_tree(&self, name: &str) -> Result<()> {
        let mut trees = self.trees.write();
        if trees.remove(name).is_none() {
            bail!("tree '{}' does not exist", name);
        }
        Ok(())
    }

    /// Moves `old` over `new`, replacing any existing tree of that name.
    /// Used by clean import to swap freshly built trees into place.
    pub fn rename_tree(&self, old: &str, new: &str) -> Result<()> {
        let _apply = self.apply_lock.write();
        let mut trees = self.trees.write();
        let Some(tree) = trees.remove(old) else {
            bail!("tree '{}' does not exist", old);
        };
        trees.insert(new.to_string(), tree);
        Ok(())
    }

    pub(crate) fn tree(&self, name: &str) -> Result<Arc<Tree>> {
        self.trees
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| eyre::eyre!("tree '{}' does not exist", name))
    }

    /// Non-transactional write, used by bulk import and index rebuild while
    /// the owning container holds its structural write lock.
    pub fn put_raw(&self, tree: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let tree = self.tree(tree)?;
        let _apply = self.apply_lock.write();
        tree.map.write().insert(key, value);
        Ok(())
    }

    pub fn delete_raw(&self, tree: &str, key: &[u8]) -> Result<()> {
        let tree = self.tree(tree)?;
        let _apply = self.apply_lock.write();
        tree.map.write().remove(key);
        Ok(())
    }

    pub fn clear_tree(&self, name: &str) -> Result<()> {
        let tree = self.tree(name)?;
        let _apply = self.apply_lock.write();
        tree.map.write().clear();
        Ok(())
    }

    /// Writes every tree to disk and prunes snapshot files of trees that no
    /// longer exist.
    pub fn checkpoint(&self) -> Result<()> {
        let trees: Vec<(String, Arc<Tree>)> = {
            let guard = self.trees.read();
            guard.iter().map(|(n, t)| (n.clone(), t.clone())).collect()
        };
        let _apply = self.apply_lock.read();
        let mut live_files = Vec::new();
        for (name, tree) in &trees {
            let path = persist::store_tree(&self.dir, name, &tree.map.read())?;
            live_files.push(path);
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("tree")
                && !live_files.contains(&path)
            {
                fs::remove_file(&path)
                    .wrap_err_with(|| format!("failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.checkpoint()
    }
}

impl TreeRead for TreeStore {
    fn get_tree(&self, tree: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let tree = self.tree(tree)?;
        let _apply = self.apply_lock.read();
        let out = tree.map.read().get(key).cloned();
        Ok(out)
    }

    fn scan_tree(
        &self,
        tree: &str,
        lower: &[u8],
        upper: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let tree = self.tree(tree)?;
        let _apply = self.apply_lock.read();
        let map = tree.map.read();
        let out = match upper {
            Some(upper) => map
                .range(lower.to_vec()..upper.to_vec())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => map
                .range(lower.to_vec()..)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        Ok(out)
    }
}
