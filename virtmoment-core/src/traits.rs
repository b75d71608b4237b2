//! Snapshot driver abstraction.

use async_trait::async_trait;
use bitflags::bitflags;
use std::sync::Arc;

use crate::error::{MomentError, Result};
use crate::moment::{try_from_bits, DeleteOutcome, DeletePolicy};
use crate::types::{DomainRef, SnapshotHandle};

bitflags! {
    /// Flags of [`SnapshotDriver::create_snapshot`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SnapshotCreateFlags: u32 {
        /// Take a new snapshot.
        const NONE = 0;
        /// Restore metadata of an existing snapshot instead of taking a new one.
        const REDEFINE = 1 << 0;
        /// With REDEFINE: make the snapshot current.
        const CURRENT = 1 << 1;
        /// Take the snapshot without tracking it afterwards.
        const NO_METADATA = 1 << 2;
    }
}

impl SnapshotCreateFlags {
    /// Validate raw bits, including the combinations that make no sense.
    pub fn parse(bits: u32) -> Result<Self> {
        let flags: Self = try_from_bits(bits)?;
        if flags.contains(Self::REDEFINE | Self::NO_METADATA) {
            return Err(MomentError::InvalidFlags {
                flags: bits,
                supported: (Self::all() - Self::NO_METADATA).bits(),
            });
        }
        if flags.contains(Self::CURRENT) && !flags.contains(Self::REDEFINE) {
            return Err(MomentError::InvalidFlags {
                flags: bits,
                supported: (Self::REDEFINE | Self::NO_METADATA).bits(),
            });
        }
        Ok(flags)
    }
}

bitflags! {
    /// Flags of [`SnapshotDriver::delete`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SnapshotDeleteFlags: u32 {
        /// Use the configured default policy.
        const NONE = 0;
        /// Delete the snapshot and all of its descendants.
        const CHILDREN = 1 << 0;
        /// Only drop tracking metadata.
        const METADATA_ONLY = 1 << 1;
        /// Delete the descendants but keep the snapshot.
        const CHILDREN_ONLY = 1 << 2;
    }
}

impl SnapshotDeleteFlags {
    /// Pick the deletion policy, `default` when no children flag is set.
    pub fn policy(bits: u32, default: DeletePolicy) -> Result<DeletePolicy> {
        let flags: Self = try_from_bits(bits)?;
        match (
            flags.contains(Self::CHILDREN),
            flags.contains(Self::CHILDREN_ONLY),
        ) {
            (true, true) => Err(MomentError::InvalidFlags {
                flags: bits,
                supported: Self::all().bits(),
            }),
            (true, false) => Ok(DeletePolicy::Children),
            (false, true) => Ok(DeletePolicy::ChildrenOnly),
            (false, false) => Ok(default),
        }
    }
}

/// Snapshot management interface of a hypervisor driver.
///
/// Listing and counting take the public [`SnapshotListFlags`] bits;
/// unknown bits are rejected.
///
/// [`SnapshotListFlags`]: crate::snapshot::SnapshotListFlags
#[async_trait]
pub trait SnapshotDriver: Send + Sync {
    // =========================================================================
    // Domains
    // =========================================================================

    /// Start tracking snapshots of a domain, loading any persisted ones.
    async fn define_domain(&self, domain: DomainRef) -> Result<Arc<DomainRef>>;

    /// Stop tracking a domain and drop all of its snapshot metadata.
    async fn undefine_domain(&self, domain: &str) -> Result<()>;

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Take (or with REDEFINE, restore metadata of) a snapshot.
    async fn create_snapshot(&self, domain: &str, xml: &str, flags: u32) -> Result<SnapshotHandle>;

    /// Look up a snapshot by name.
    async fn lookup(&self, domain: &str, name: &str) -> Result<SnapshotHandle>;

    /// The current snapshot, if any.
    async fn current(&self, domain: &str) -> Result<Option<SnapshotHandle>>;

    /// The parent of a snapshot, `None` for roots.
    async fn parent(&self, snapshot: &SnapshotHandle) -> Result<Option<SnapshotHandle>>;

    /// List the snapshots of a domain.
    async fn list(&self, domain: &str, flags: u32) -> Result<Vec<SnapshotHandle>>;

    /// List the children (or descendants) of a snapshot.
    async fn list_children(&self, snapshot: &SnapshotHandle, flags: u32) -> Result<Vec<SnapshotHandle>>;

    /// Count the snapshots [`SnapshotDriver::list`] would return.
    async fn num(&self, domain: &str, flags: u32) -> Result<usize>;

    /// Count the snapshots [`SnapshotDriver::list_children`] would return.
    async fn num_children(&self, snapshot: &SnapshotHandle, flags: u32) -> Result<usize>;

    /// Revert the domain to a snapshot, making it current.
    async fn revert(&self, snapshot: &SnapshotHandle) -> Result<()>;

    /// Delete a snapshot according to [`SnapshotDeleteFlags`].
    async fn delete(&self, snapshot: &SnapshotHandle, flags: u32) -> Result<DeleteOutcome>;

    /// The `<domainsnapshot>` document of a snapshot.
    async fn xml(&self, snapshot: &SnapshotHandle) -> Result<String>;

    /// All snapshots of a domain as one `<snapshots>` document.
    async fn export(&self, domain: &str) -> Result<String>;

    /// Restore all snapshots of a domain without any from a `<snapshots>`
    /// document.
    async fn import(&self, domain: &str, xml: &str) -> Result<()>;
}
