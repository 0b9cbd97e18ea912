//! # Operation Errors
//!
//! The typed error surface for entry operations. Internal storage code uses
//! `eyre::Result` with context strings; failures cross into this taxonomy
//! at the operation boundary as the `Storage` variant and are never retried
//! at this layer.
//!
//! Not-found errors carry the `matched_dn`: the nearest existing ancestor
//! of the requested DN, for client-side diagnostics.

use crate::dn::Dn;
use thiserror::Error;

pub type OpResult<T> = Result<T, OperationError>;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("no such entry: {dn}")]
    NoSuchObject { dn: Dn, matched_dn: Option<Dn> },

    #[error("parent entry of {dn} does not exist")]
    NoSuchParent { dn: Dn, matched_dn: Option<Dn> },

    #[error("entry already exists: {dn}")]
    EntryAlreadyExists { dn: Dn },

    #[error("entry {dn} has subordinate entries")]
    NotAllowedOnNonLeaf { dn: Dn },

    #[error("{dn} is not a base DN of this container")]
    NotABaseDn { dn: Dn },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(eyre::Report),
}

impl From<eyre::Report> for OperationError {
    fn from(report: eyre::Report) -> Self {
        OperationError::Storage(report)
    }
}

impl OperationError {
    /// The nearest existing ancestor recorded for not-found errors.
    pub fn matched_dn(&self) -> Option<&Dn> {
        match self {
            OperationError::NoSuchObject { matched_dn, .. }
            | OperationError::NoSuchParent { matched_dn, .. } => matched_dn.as_ref(),
            _ => None,
        }
    }
}
