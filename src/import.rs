//! # Bulk LDIF Import
//!
//! Imports a whole LDIF stream into one container while holding the
//! container's structural write lock, so no entry operation observes a
//! half-imported tree.
//!
//! Two modes:
//!
//! - **Rebuild** (the default): entries are staged in memory with their
//!   IDs assigned in stream order, index postings are accumulated per key,
//!   and finalize writes everything into `<tree>.tmp` shadow trees that
//!   are renamed over the live trees in one pass. Existing content is
//!   discarded; entry limits are applied once, at finalize, when each
//!   key's full posting set is known.
//! - **Append**: each record goes through the container's normal add path
//!   (optionally replacing entries whose DN already exists).
//!
//! Records that fail are routed, not fatal: entries outside the base or
//! the branch filters go to the skip stream, malformed records and
//! entries whose parent is missing go to the reject stream. Only storage
//! failures and read failures on the LDIF input itself abort the import.
//!
//! ```text
//! NotStarted --run()--> Reading --finalize--> Finalizing --> Done
//! ```

use crate::container::dn2uri::encode_uris;
use crate::container::entry_container::NEXT_ID_KEY;
use crate::container::EntryContainer;
use crate::dn::Dn;
use crate::entry::{Entry, EntryId};
use crate::error::OperationError;
use crate::index::indexer::keys_for;
use crate::index::EntryIdSet;
use crate::ldif::{LdifError, LdifReader, LdifWriter};
use eyre::{bail, Result, WrapErr};
use hashbrown::HashMap;
use std::io::{BufRead, Write};

#[derive(Debug, Clone, Default)]
pub struct ImportConfig {
    /// Only entries under one of these branches are imported (empty means
    /// everything under the base DN).
    pub include_branches: Vec<Dn>,
    pub exclude_branches: Vec<Dn>,
    /// Keep existing entries and add to them instead of rebuilding.
    pub append: bool,
    /// With `append`: a DN collision replaces the stored entry instead of
    /// rejecting the record.
    pub replace_existing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    NotStarted,
    Reading,
    Finalizing,
    Done,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub entries_read: usize,
    pub imported: usize,
    pub rejected: usize,
    pub skipped: usize,
}

pub struct ImportJob<'a> {
    container: &'a EntryContainer,
    config: ImportConfig,
    state: ImportState,
    reject: Option<LdifWriter<Box<dyn Write + 'a>>>,
    skip: Option<LdifWriter<Box<dyn Write + 'a>>>,
}

impl<'a> ImportJob<'a> {
    pub fn new(container: &'a EntryContainer, config: ImportConfig) -> ImportJob<'a> {
        ImportJob {
            container,
            config,
            state: ImportState::NotStarted,
            reject: None,
            skip: None,
        }
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    /// Stream rejected records (with a comment naming the reason) to `w`.
    pub fn reject_to(mut self, w: impl Write + 'a) -> Self {
        self.reject = Some(LdifWriter::new(Box::new(w)));
        self
    }

    /// Stream skipped records (with a comment naming the reason) to `w`.
    pub fn skip_to(mut self, w: impl Write + 'a) -> Self {
        self.skip = Some(LdifWriter::new(Box::new(w)));
        self
    }

    pub fn run<R: BufRead>(&mut self, reader: LdifReader<R>) -> Result<ImportResult> {
        if self.state != ImportState::NotStarted {
            bail!("import job has already run");
        }
        let _guard = self.container.shared_lock.write();
        self.state = ImportState::Reading;

        let mut result = ImportResult::default();
        let mut staged = Staged::new();

        for record in reader {
            let entry = match record {
                Ok(entry) => entry,
                Err(LdifError::Io(e)) => {
                    // The input itself failed; abort before any tree swap.
                    return Err(e).wrap_err("import aborted: failed to read the LDIF stream");
                }
                Err(LdifError::Record(e)) => {
                    result.rejected += 1;
                    self.write_reject(None, &format!("unparseable record: {}", e))?;
                    continue;
                }
            };
            result.entries_read += 1;

            if !entry.dn().is_subordinate_or_equal(self.container.base_dn()) {
                result.skipped += 1;
                self.write_skip(&entry, "outside the base DN")?;
                continue;
            }
            if !self.branch_allows(entry.dn()) {
                result.skipped += 1;
                self.write_skip(&entry, "excluded by branch filters")?;
                continue;
            }

            if self.config.append {
                self.append_entry(entry, &mut result)?;
            } else {
                self.stage_entry(entry, &mut staged, &mut result)?;
            }
        }

        self.state = ImportState::Finalizing;
        if !self.config.append {
            self.finalize_rebuild(staged)?;
        }
        self.state = ImportState::Done;
        Ok(result)
    }

    fn branch_allows(&self, dn: &Dn) -> bool {
        if self
            .config
            .exclude_branches
            .iter()
            .any(|b| dn.is_subordinate_or_equal(b))
        {
            return false;
        }
        self.config.include_branches.is_empty()
            || self
                .config
                .include_branches
                .iter()
                .any(|b| dn.is_subordinate_or_equal(b))
    }

    /// An include-branch root stands in for the base: its parent chain is
    /// not part of the import.
    fn is_import_root(&self, dn: &Dn) -> bool {
        *dn == *self.container.base_dn()
            || self.config.include_branches.iter().any(|b| b == dn)
    }

    fn append_entry(&mut self, entry: Entry, result: &mut ImportResult) -> Result<()> {
        match self.container.add_entry_unlocked(&entry) {
            Ok(_) => {
                result.imported += 1;
            }
            Err(OperationError::EntryAlreadyExists { .. }) if self.config.replace_existing => {
                self.container
                    .replace_entry_unlocked(&entry)
                    .map_err(to_storage_error)?;
                result.imported += 1;
            }
            Err(OperationError::Storage(e)) => return Err(e),
            Err(e) => {
                result.rejected += 1;
                self.write_reject(Some(&entry), &e.to_string())?;
            }
        }
        Ok(())
    }

    fn stage_entry(
        &mut self,
        entry: Entry,
        staged: &mut Staged,
        result: &mut ImportResult,
    ) -> Result<()> {
        let dn_key = entry.dn().key();
        if let Some(&idx) = staged.by_dn.get(&dn_key) {
            if self.config.replace_existing {
                staged.entries[idx].1 = entry;
                return Ok(());
            }
            result.rejected += 1;
            self.write_reject(Some(&entry), "entry already exists")?;
            return Ok(());
        }
        if !self.is_import_root(entry.dn()) {
            let parent_present = entry
                .dn()
                .parent()
                .map(|p| staged.by_dn.contains_key(&p.key()))
                .unwrap_or(false);
            if !parent_present {
                result.rejected += 1;
                self.write_reject(Some(&entry), "parent entry does not exist")?;
                return Ok(());
            }
        }
        let id = EntryId(staged.next_id);
        staged.next_id += 1;
        staged.by_dn.insert(dn_key, staged.entries.len());
        staged.entries.push((id, entry));
        result.imported += 1;
        Ok(())
    }

    /// Builds every container tree from the staged entries in `.tmp`
    /// shadows, then swaps them all into place.
    fn finalize_rebuild(&mut self, staged: Staged) -> Result<()> {
        let ec = self.container;
        let store = ec.store();
        let prefix = ec.prefix();

        // (attr, keyspace) of every configured index, with its tree and limit
        let mut index_plan: Vec<(String, crate::index::IndexType, String, usize, usize)> =
            Vec::new();
        for attr in ec.indexed_attributes() {
            let Some(ai) = ec.attr_index(&attr) else {
                continue;
            };
            let cfg = ai.config().clone();
            for &ty in &cfg.types {
                let tree = format!("{}_{}.{}", prefix, attr, ty.index_id(cfg.substring_length));
                let limit = ai
                    .index_for(ty)
                    .map(|i| i.entry_limit())
                    .unwrap_or(usize::MAX);
                if !index_plan.iter().any(|(_, _, t, _, _)| *t == tree) {
                    index_plan.push((attr.clone(), ty, tree, limit, cfg.substring_length));
                }
            }
        }

        let live_trees = ec.all_tree_names();
        for name in &live_trees {
            let tmp = tmp_name(name);
            store.ensure_tree(&tmp);
            store.clear_tree(&tmp)?;
        }

        let dn2id_tmp = tmp_name(ec.dn2id().tree_name());
        let id2entry_tmp = tmp_name(ec.id2entry().tree_name());
        let dn2uri_tmp = tmp_name(ec.dn2uri().tree_name());
        let meta_tmp = tmp_name(&format!("{}_meta", prefix));

        let mut postings: HashMap<(String, Vec<u8>), EntryIdSet> = HashMap::new();
        for (id, entry) in &staged.entries {
            store.put_raw(&dn2id_tmp, entry.dn().key(), id.key().to_vec())?;
            store.put_raw(&id2entry_tmp, id.key().to_vec(), entry.encode())?;
            if entry.is_referral() && !entry.referral_uris().is_empty() {
                store.put_raw(&dn2uri_tmp, entry.dn().key(), encode_uris(entry.referral_uris()))?;
            }
            for (attr, ty, tree, _, substring_length) in &index_plan {
                let Some(values) = entry.attribute(attr) else {
                    continue;
                };
                for key in keys_for(*ty, values, *substring_length) {
                    postings.entry((tree.clone(), key)).or_default().insert(*id);
                }
            }
        }
        for ((tree, key), mut set) in postings {
            let limit = index_plan
                .iter()
                .find(|(_, _, t, _, _)| *t == tree)
                .map(|(_, _, _, l, _)| *l)
                .unwrap_or(usize::MAX);
            if set.size().unwrap_or(0) > limit {
                set = EntryIdSet::undefined();
            }
            store.put_raw(&tmp_name(&tree), key, set.encode())?;
        }
        store.put_raw(
            &meta_tmp,
            NEXT_ID_KEY.to_vec(),
            staged.next_id.to_be_bytes().to_vec(),
        )?;

        for name in &live_trees {
            store.rename_tree(&tmp_name(name), name)?;
        }
        Ok(())
    }

    fn write_reject(&mut self, entry: Option<&Entry>, reason: &str) -> Result<()> {
        if let Some(w) = self.reject.as_mut() {
            w.write_comment(reason)?;
            if let Some(entry) = entry {
                w.write_entry(entry)?;
            }
        }
        Ok(())
    }

    fn write_skip(&mut self, entry: &Entry, reason: &str) -> Result<()> {
        if let Some(w) = self.skip.as_mut() {
            w.write_comment(reason)?;
            w.write_entry(entry)?;
        }
        Ok(())
    }
}

struct Staged {
    next_id: u64,
    by_dn: HashMap<Vec<u8>, usize>,
    entries: Vec<(EntryId, Entry)>,
}

impl Staged {
    fn new() -> Staged {
        Staged {
            next_id: 1,
            by_dn: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

fn tmp_name(tree: &str) -> String {
    format!("{}.tmp", tree)
}

fn to_storage_error(e: OperationError) -> eyre::Report {
    eyre::eyre!(e.to_string())
}
