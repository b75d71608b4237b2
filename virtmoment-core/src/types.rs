//! Public handle types handed out by listing operations.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{MomentError, Result};

// =============================================================================
// DOMAIN
// =============================================================================

/// Identity of the domain owning a set of moments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRef {
    /// Domain name
    pub name: String,
    /// Domain UUID
    pub uuid: Uuid,
}

impl DomainRef {
    /// Create a domain reference with a fresh UUID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4(),
        }
    }

    /// Set the domain UUID.
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }
}

// =============================================================================
// MOMENT HANDLES
// =============================================================================

/// Handle to one snapshot of a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    /// Owning domain
    pub domain: Arc<DomainRef>,
    /// Snapshot name
    pub name: String,
}

impl SnapshotHandle {
    /// Create a handle; the name must be non-empty.
    pub fn new(domain: Arc<DomainRef>, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(MomentError::HandleFailed {
                name: name.to_string(),
                reason: "empty snapshot name".to_string(),
            });
        }
        Ok(Self {
            domain,
            name: name.to_string(),
        })
    }
}

/// Handle to one checkpoint of a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointHandle {
    /// Owning domain
    pub domain: Arc<DomainRef>,
    /// Checkpoint name
    pub name: String,
}

impl CheckpointHandle {
    /// Create a handle; the name must be non-empty.
    pub fn new(domain: Arc<DomainRef>, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(MomentError::HandleFailed {
                name: name.to_string(),
                reason: "empty checkpoint name".to_string(),
            });
        }
        Ok(Self {
            domain,
            name: name.to_string(),
        })
    }
}
