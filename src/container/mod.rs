//! # Entry Containers
//!
//! One [`EntryContainer`] holds everything stored under a single base DN:
//! the DN2ID, ID2Entry, and DN2URI primary trees plus every attribute
//! index, guarded by the container's shared lock. The [`RootContainer`]
//! owns all containers of one backend instance and routes DNs to the
//! container with the longest matching base.

pub mod dn2id;
pub mod dn2uri;
pub mod entry_container;
pub mod id2entry;
pub mod root_container;

pub use entry_container::EntryContainer;
pub use root_container::RootContainer;

/// Stable tree-name prefix for one container, derived from its base DN:
/// normalized form with every byte outside `[a-z0-9-]` mapped to `_`.
pub fn container_prefix(base_dn: &crate::dn::Dn) -> String {
    base_dn
        .normalized()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
