//! # Attribute Indexing Engine
//!
//! A secondary index is a key→EntryId-set multimap stored in one tree of
//! the transactional store. Keys are opaque byte strings produced by pure
//! indexer functions ([`indexer`]); the generic [`index::Index`] maintains
//! postings with entry-limit degradation; [`attr_index::AttributeIndex`]
//! groups the per-matching-rule indexes of a single attribute and computes
//! key-set deltas when entries change.

pub mod attr_index;
pub mod id_set;
pub mod index;
pub mod indexer;

pub use attr_index::AttributeIndex;
pub use id_set::{ConditionResult, EntryIdSet};
pub use index::Index;
pub use indexer::IndexType;
