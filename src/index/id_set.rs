//! # Entry ID Sets
//!
//! The posting set stored under one index key: a sorted vector of entry
//! IDs, or the *undefined* state once a key has exceeded its entry limit.
//! Undefined sets answer no precise membership question; set algebra
//! propagates undefinedness the way candidate evaluation needs it
//! (intersection with a defined set stays bounded, union becomes
//! undefined).
//!
//! ## Codec
//!
//! ```text
//! defined:   [0x00][varint count][varint first][varint delta]...
//! undefined: [0x01]
//! ```
//!
//! IDs are strictly increasing, so delta encoding keeps postings compact.

use crate::encoding::{read_varint, write_varint};
use crate::entry::EntryId;
use eyre::{bail, Result};

const TAG_DEFINED: u8 = 0x00;
const TAG_UNDEFINED: u8 = 0x01;

/// Three-valued index membership answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionResult {
    True,
    False,
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryIdSet {
    /// `None` is the undefined (over-limit) state.
    ids: Option<Vec<EntryId>>,
}

impl EntryIdSet {
    pub fn new() -> EntryIdSet {
        EntryIdSet { ids: Some(Vec::new()) }
    }

    pub fn undefined() -> EntryIdSet {
        EntryIdSet { ids: None }
    }

    pub fn from_ids(mut ids: Vec<EntryId>) -> EntryIdSet {
        ids.sort_unstable();
        ids.dedup();
        EntryIdSet { ids: Some(ids) }
    }

    pub fn is_defined(&self) -> bool {
        self.ids.is_some()
    }

    /// Defined size; `None` when undefined.
    pub fn size(&self) -> Option<usize> {
        self.ids.as_ref().map(|v| v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.size() == Some(0)
    }

    /// Idempotent insert; returns false if already present or undefined.
    pub fn insert(&mut self, id: EntryId) -> bool {
        let Some(ids) = self.ids.as_mut() else {
            return false;
        };
        match ids.binary_search(&id) {
            Ok(_) => false,
            Err(pos) => {
                ids.insert(pos, id);
                true
            }
        }
    }

    /// Idempotent remove; no-op on undefined sets.
    pub fn remove(&mut self, id: EntryId) -> bool {
        let Some(ids) = self.ids.as_mut() else {
            return false;
        };
        match ids.binary_search(&id) {
            Ok(pos) => {
                ids.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, id: EntryId) -> ConditionResult {
        match &self.ids {
            None => ConditionResult::Undefined,
            Some(ids) => {
                if ids.binary_search(&id).is_ok() {
                    ConditionResult::True
                } else {
                    ConditionResult::False
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.ids.iter().flatten().copied()
    }

    /// Intersection. An undefined side imposes no bound, so the other side
    /// wins; both undefined stays undefined.
    pub fn intersect(&self, other: &EntryIdSet) -> EntryIdSet {
        match (&self.ids, &other.ids) {
            (None, None) => EntryIdSet::undefined(),
            (Some(_), None) => self.clone(),
            (None, Some(_)) => other.clone(),
            (Some(a), Some(b)) => {
                let mut out = Vec::with_capacity(a.len().min(b.len()));
                let (mut i, mut j) = (0, 0);
                while i < a.len() && j < b.len() {
                    match a[i].cmp(&b[j]) {
                        std::cmp::Ordering::Less => i += 1,
                        std::cmp::Ordering::Greater => j += 1,
                        std::cmp::Ordering::Equal => {
                            out.push(a[i]);
                            i += 1;
                            j += 1;
                        }
                    }
                }
                EntryIdSet { ids: Some(out) }
            }
        }
    }

    /// Union. Any undefined side makes the result undefined.
    pub fn union(&self, other: &EntryIdSet) -> EntryIdSet {
        match (&self.ids, &other.ids) {
            (Some(a), Some(b)) => {
                let mut out = Vec::with_capacity(a.len() + b.len());
                let (mut i, mut j) = (0, 0);
                while i < a.len() || j < b.len() {
                    if j >= b.len() || (i < a.len() && a[i] < b[j]) {
                        out.push(a[i]);
                        i += 1;
                    } else if i >= a.len() || b[j] < a[i] {
                        out.push(b[j]);
                        j += 1;
                    } else {
                        out.push(a[i]);
                        i += 1;
                        j += 1;
                    }
                }
                EntryIdSet { ids: Some(out) }
            }
            _ => EntryIdSet::undefined(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match &self.ids {
            None => vec![TAG_UNDEFINED],
            Some(ids) => {
                let mut buf = vec![TAG_DEFINED];
                write_varint(&mut buf, ids.len() as u64);
                let mut prev = 0u64;
                for id in ids {
                    write_varint(&mut buf, id.as_u64() - prev);
                    prev = id.as_u64();
                }
                buf
            }
        }
    }

    pub fn decode(buf: &[u8]) -> Result<EntryIdSet> {
        match buf.first() {
            Some(&TAG_UNDEFINED) => Ok(EntryIdSet::undefined()),
            Some(&TAG_DEFINED) => {
                let mut pos = 1;
                let count = read_varint(buf, &mut pos)?;
                let mut ids = Vec::with_capacity(count as usize);
                let mut prev = 0u64;
                for _ in 0..count {
                    prev += read_varint(buf, &mut pos)?;
                    ids.push(EntryId(prev));
                }
                Ok(EntryIdSet { ids: Some(ids) })
            }
            _ => bail!("bad entry ID set tag"),
        }
    }
}

impl Default for EntryIdSet {
    fn default() -> Self {
        EntryIdSet::new()
    }
}
