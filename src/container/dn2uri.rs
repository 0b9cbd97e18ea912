//! # DN-to-URI Tree
//!
//! Referral bookkeeping: maps the DN key of every referral entry to its
//! `ref` URIs. During an operation the container consults this tree to
//! find a referral at or above the target DN; when one exists the search
//! result carries the rewritten URIs instead of descending further.

use crate::dn::Dn;
use crate::encoding::{read_str, read_varint, write_str, write_varint};
use crate::entry::Entry;
use crate::storage::{TreeRead, TreeStore, WriteTxn};
use eyre::{ensure, Result};

pub struct Dn2Uri {
    tree: String,
}

impl Dn2Uri {
    pub fn new(prefix: &str) -> Dn2Uri {
        Dn2Uri {
            tree: format!("{}_dn2uri", prefix),
        }
    }

    pub fn tree_name(&self) -> &str {
        &self.tree
    }

    pub fn open(&self, store: &TreeStore) {
        store.ensure_tree(&self.tree);
    }

    /// Records (or clears) the URI mapping appropriate for `entry`.
    pub fn update_for(&self, txn: &mut WriteTxn<'_>, entry: &Entry) {
        if entry.is_referral() && !entry.referral_uris().is_empty() {
            txn.put(
                &self.tree,
                entry.dn().key(),
                encode_uris(entry.referral_uris()),
            );
        } else {
            txn.delete(&self.tree, entry.dn().key());
        }
    }

    pub fn remove(&self, txn: &mut WriteTxn<'_>, dn: &Dn) {
        txn.delete(&self.tree, dn.key());
    }

    pub fn get(&self, r: &impl TreeRead, dn: &Dn) -> Result<Option<Vec<String>>> {
        match r.get_tree(&self.tree, &dn.key())? {
            None => Ok(None),
            Some(raw) => Ok(Some(decode_uris(&raw)?)),
        }
    }

    /// Nearest referral at or above `dn` (excluding `dn` itself when
    /// `include_self` is false), searched no higher than `base`.
    pub fn nearest_referral(
        &self,
        r: &impl TreeRead,
        dn: &Dn,
        base: &Dn,
        include_self: bool,
    ) -> Result<Option<(Dn, Vec<String>)>> {
        if include_self {
            if let Some(uris) = self.get(r, dn)? {
                return Ok(Some((dn.clone(), uris)));
            }
        }
        for ancestor in dn.ancestors() {
            if !ancestor.is_subordinate_or_equal(base) {
                break;
            }
            if let Some(uris) = self.get(r, &ancestor)? {
                return Ok(Some((ancestor, uris)));
            }
        }
        Ok(None)
    }
}

pub(crate) fn encode_uris(uris: &[String]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_varint(&mut buf, uris.len() as u64);
    for uri in uris {
        write_str(&mut buf, uri);
    }
    buf
}

fn decode_uris(buf: &[u8]) -> Result<Vec<String>> {
    let mut pos = 0;
    let count = read_varint(buf, &mut pos)?;
    let mut uris = Vec::with_capacity(count as usize);
    for _ in 0..count {
        uris.push(read_str(buf, &mut pos)?);
    }
    ensure!(pos == buf.len(), "trailing bytes after URI record");
    Ok(uris)
}
