//! # dirstore - Embedded Directory Storage Engine
//!
//! dirstore is the storage and indexing core of an LDAP directory backend:
//! hierarchical entries keyed by distinguished name, stored in an embedded
//! transactional tree store with maintained secondary indexes. It
//! prioritizes:
//!
//! - **Atomic entry operations**: an entry and all of its index postings
//!   move in one transaction, never separately
//! - **Hierarchy as a key range**: the DN key encoding makes a subtree one
//!   contiguous range, so scope resolution is a range scan
//! - **Bounded index cost**: per-key entry limits degrade hot index keys
//!   to an undefined sentinel instead of growing without bound
//!
//! ## Quick Start
//!
//! ```ignore
//! use dirstore::{BackendConfig, Dn, Entry, IndexConfig, IndexType, RootContainer};
//!
//! let config = BackendConfig::builder()
//!     .db_path("./data")
//!     .base_dn("dc=example,dc=com")
//!     .index("cn", IndexConfig::new([IndexType::Equality, IndexType::Substring]))
//!     .build()?;
//! let root = RootContainer::open(config)?;
//!
//! let base = Dn::parse("dc=example,dc=com")?;
//! let container = root.container(&base)?;
//! container.add_entry(&Entry::new(base).with_attribute("objectclass", vec!["domain"]))?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        RootContainer (DN routing)        │
//! ├──────────────────────────────────────────┤
//! │  EntryContainer (one per base DN)        │
//! │  entry ops │ search │ import │ reconfig  │
//! ├────────────┬─────────────────────────────┤
//! │  dn2id │ id2entry │ dn2uri │ attr indexes│
//! ├──────────────────────────────────────────┤
//! │  TreeStore (named ordered trees,         │
//! │  single-writer txns, checkpoints)        │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Tree Layout
//!
//! Every base DN owns a family of trees named by a prefix derived from the
//! normalized base:
//!
//! ```text
//! dc_example_dc_com_dn2id          DN key -> entry ID
//! dc_example_dc_com_id2entry       entry ID -> serialized entry
//! dc_example_dc_com_dn2uri         referral DN key -> ref URIs
//! dc_example_dc_com_meta           ID allocator state
//! dc_example_dc_com_cn.equality    index postings, one tree per
//! dc_example_dc_com_cn.substring.6 attribute and key space
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: named ordered trees, write transactions, checkpoints
//! - [`dn`]: DN parsing, normalization, byte-comparable key encoding
//! - [`entry`]: the entry model, modifications, serialization
//! - [`index`]: indexers, posting sets, per-attribute index maintenance
//! - [`container`]: entry containers, primary trees, DN routing
//! - [`search`]: filters, index-driven candidate narrowing, execution
//! - [`ldif`]: LDIF reader and writer
//! - [`import`]: bulk import with staged tree rebuild

pub mod config;
pub mod container;
pub mod dn;
pub mod encoding;
pub mod entry;
pub mod error;
pub mod import;
pub mod index;
pub mod ldif;
pub mod search;
pub mod storage;

pub use config::{BackendConfig, IndexConfig};
pub use container::{EntryContainer, RootContainer};
pub use dn::{Dn, Rdn};
pub use entry::{Entry, EntryId, Modification};
pub use error::{OperationError, OpResult};
pub use import::{ImportConfig, ImportJob, ImportResult, ImportState};
pub use index::{ConditionResult, EntryIdSet, IndexType};
pub use ldif::{LdifError, LdifReader, LdifWriter};
pub use search::{Filter, SearchRequest, SearchResult, SearchScope};
