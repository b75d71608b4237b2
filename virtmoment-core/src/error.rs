//! Error types for moment trees and the drivers built on them.

use thiserror::Error;

/// Errors that can occur while managing snapshot and checkpoint trees.
#[derive(Error, Debug)]
pub enum MomentError {
    /// Reserving room for a new entry or result failed.
    #[error("Out of memory while growing moment list")]
    AllocationFailed,

    /// A moment with this name is already in the list.
    #[error("Moment already exists: {0}")]
    DuplicateName(String),

    /// A moment names a parent that is not in the list.
    #[error("Cannot find parent '{parent}' of moment '{name}'")]
    MissingParent { name: String, parent: String },

    /// Following parent links from a moment leads back to it.
    #[error("Circular moment relationship involving '{name}'")]
    CycleDetected { name: String },

    /// A definition names itself as parent.
    #[error("Cannot set moment '{0}' as its own parent")]
    SelfParent(String),

    /// Redefining a moment under `parent` would close a loop.
    #[error("Parent '{parent}' would create cycle to '{name}'")]
    ParentCycle { parent: String, name: String },

    /// Named moment does not exist.
    #[error("Moment not found: {0}")]
    NotFound(String),

    /// Domain does not exist.
    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    /// Caller passed flag bits the operation does not know.
    #[error("Unsupported flags 0x{flags:x} (supported: 0x{supported:x})")]
    InvalidFlags { flags: u32, supported: u32 },

    /// Definition contents are unusable.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// Object is in an invalid state for the requested operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    /// Building a public handle for a listed moment failed.
    #[error("Failed to create handle for '{name}': {reason}")]
    HandleFailed { name: String, reason: String },

    /// XML generation/parsing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// Metadata store I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<quick_xml::de::DeError> for MomentError {
    fn from(err: quick_xml::de::DeError) -> Self {
        MomentError::Xml(err.to_string())
    }
}

/// Result type alias for moment operations.
pub type Result<T> = std::result::Result<T, MomentError>;
