//! Error types for SalDB core.

use crate::types::RevisionId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in SalDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An object, revision, tag or type is absent.
    #[error("not found: {what}")]
    NotFound {
        /// Description of what was looked up.
        what: String,
    },

    /// Optimistic commit collision: the parent is no longer the latest revision.
    #[error("commit conflict: based on {parent} but latest is {latest}")]
    Conflict {
        /// Revision the commit was based on.
        parent: RevisionId,
        /// Revision that is actually the latest.
        latest: RevisionId,
    },

    /// Mutation attempted while pinned to a non-latest revision.
    #[error("revision {revision} is immutable")]
    ImmutableRevision {
        /// The pinned revision.
        revision: RevisionId,
    },

    /// An unqualified field name exists in more than one schema of a type.
    #[error("field `{field}` is ambiguous across schemas {schemas:?}")]
    AmbiguousField {
        /// The requested field name.
        field: String,
        /// Schemas that declare the field.
        schemas: Vec<String>,
    },

    /// A field name exists in none of the schemas of a type.
    #[error("type `{type_name}` has no field `{field}`")]
    UnknownField {
        /// The object's type.
        type_name: String,
        /// The requested field.
        field: String,
    },

    /// A value of an unsupported kind was submitted to an index.
    #[error("index `{index}` cannot hold a {found} value")]
    IndexTypeMismatch {
        /// Index name.
        index: String,
        /// Description of the offending value.
        found: String,
    },

    /// A query referenced an index or field that does not exist.
    #[error("unknown index `{name}`")]
    UnknownIndex {
        /// The referenced name.
        name: String,
    },

    /// Query operands are not comparable.
    #[error("type mismatch: {message}")]
    TypeMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the transition is illegal.
        message: String,
    },

    /// A schema constraint or registry declaration was violated.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the violation.
        message: String,
    },

    /// Saved state could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }

    /// Creates an unknown index error.
    pub fn unknown_index(name: impl Into<String>) -> Self {
        Self::UnknownIndex { name: name.into() }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Returns true for errors the caller can recover from by rebasing.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
