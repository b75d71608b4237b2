//! Domain snapshot definitions and their XML form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MomentError, Result};
use crate::moment::MomentDef;

// =============================================================================
// STATE
// =============================================================================

/// Domain state captured by a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SnapshotState {
    #[default]
    NoState,
    Running,
    Blocked,
    Paused,
    Shutdown,
    Shutoff,
    Crashed,
    PmSuspended,
    /// Only disks were captured, no guest state.
    DiskSnapshot,
}

impl SnapshotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoState => "nostate",
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Paused => "paused",
            Self::Shutdown => "shutdown",
            Self::Shutoff => "shutoff",
            Self::Crashed => "crashed",
            Self::PmSuspended => "pmsuspended",
            Self::DiskSnapshot => "disk-snapshot",
        }
    }

    /// Whether the guest was running (in any form) when captured.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Shutoff | Self::DiskSnapshot)
    }
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotState {
    type Err = MomentError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "nostate" => Self::NoState,
            "running" => Self::Running,
            "blocked" => Self::Blocked,
            "paused" => Self::Paused,
            "shutdown" => Self::Shutdown,
            "shutoff" => Self::Shutoff,
            "crashed" => Self::Crashed,
            "pmsuspended" => Self::PmSuspended,
            "disk-snapshot" => Self::DiskSnapshot,
            other => {
                return Err(MomentError::InvalidDefinition(format!(
                    "unknown snapshot state '{}'",
                    other
                )))
            }
        })
    }
}

impl TryFrom<String> for SnapshotState {
    type Error = MomentError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SnapshotState> for String {
    fn from(state: SnapshotState) -> Self {
        state.as_str().to_string()
    }
}

// =============================================================================
// LOCATION
// =============================================================================

/// Where the data of a snapshot (memory or one disk) lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SnapshotLocation {
    /// Not captured.
    No,
    /// Inside the disk image itself.
    #[default]
    Internal,
    /// In a separate file.
    External,
}

impl SnapshotLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Internal => "internal",
            Self::External => "external",
        }
    }
}

impl TryFrom<String> for SnapshotLocation {
    type Error = MomentError;

    fn try_from(s: String) -> Result<Self> {
        match s.as_str() {
            "no" => Ok(Self::No),
            "internal" => Ok(Self::Internal),
            "external" => Ok(Self::External),
            other => Err(MomentError::InvalidDefinition(format!(
                "unknown snapshot location '{}'",
                other
            ))),
        }
    }
}

impl From<SnapshotLocation> for String {
    fn from(location: SnapshotLocation) -> Self {
        location.as_str().to_string()
    }
}

// =============================================================================
// DEFINITION
// =============================================================================

/// Reference to the parent snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub name: String,
}

/// Memory state location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySpec {
    #[serde(rename = "@snapshot")]
    pub snapshot: SnapshotLocation,
    #[serde(rename = "@file", default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Per-disk snapshot location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@snapshot", default)]
    pub snapshot: SnapshotLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DiskSource>,
}

/// External file backing a disk snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSource {
    #[serde(rename = "@file")]
    pub file: String,
}

/// Disk list wrapper, `<disks><disk/>...</disks>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Disks {
    #[serde(rename = "disk", default)]
    pub disks: Vec<DiskSpec>,
}

impl Disks {
    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }
}

/// Snapshot definition, serialized as `<domainsnapshot>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "domainsnapshot")]
pub struct SnapshotDef {
    /// Snapshot name (defaults to the creation time)
    #[serde(default)]
    pub name: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Domain state at snapshot time
    #[serde(default)]
    pub state: SnapshotState,
    /// Seconds since the epoch
    #[serde(rename = "creationTime", default)]
    pub creation_time: i64,
    /// Parent snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
    /// Memory location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySpec>,
    /// Disk locations
    #[serde(default, skip_serializing_if = "Disks::is_empty")]
    pub disks: Disks,
}

impl SnapshotDef {
    /// Create a definition with default values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            state: SnapshotState::default(),
            creation_time: 0,
            parent: None,
            memory: None,
            disks: Disks::default(),
        }
    }

    /// Set the parent snapshot.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(ParentRef { name: parent.into() });
        self
    }

    /// Set the captured domain state.
    pub fn with_state(mut self, state: SnapshotState) -> Self {
        self.state = state;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set where memory state is kept.
    pub fn with_memory(mut self, snapshot: SnapshotLocation, file: Option<String>) -> Self {
        self.memory = Some(MemorySpec { snapshot, file });
        self
    }

    /// Add a disk.
    pub fn with_disk(mut self, name: impl Into<String>, snapshot: SnapshotLocation) -> Self {
        self.disks.disks.push(DiskSpec {
            name: name.into(),
            snapshot,
            source: None,
        });
        self
    }

    /// Whether any part of the snapshot lives outside the disk images.
    pub fn is_external(&self) -> bool {
        let memory = self
            .memory
            .as_ref()
            .is_some_and(|m| m.snapshot == SnapshotLocation::External);
        memory
            || self
                .disks
                .disks
                .iter()
                .any(|d| d.snapshot == SnapshotLocation::External)
    }

    /// Fill in the creation time and, when absent, a name derived from it.
    pub fn post_parse(&mut self) {
        self.creation_time = chrono::Utc::now().timestamp();
        if self.name.is_empty() {
            self.name = self.creation_time.to_string();
        }
    }

    /// Reject definitions that cannot be tracked or stored.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(MomentError::InvalidDefinition(
                "snapshot name must not be empty".to_string(),
            ));
        }
        if self.name.contains('/') {
            return Err(MomentError::InvalidDefinition(format!(
                "invalid snapshot name '{}'",
                self.name
            )));
        }
        Ok(())
    }

    /// Parse a `<domainsnapshot>` document.
    pub fn from_xml(xml: &str) -> Result<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    /// Serialize to a `<domainsnapshot>` document.
    pub fn to_xml(&self) -> Result<String> {
        Ok(quick_xml::se::to_string(self)?)
    }
}

impl MomentDef for SnapshotDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn parent_name(&self) -> Option<&str> {
        self.parent.as_ref().map(|p| p.name.as_str())
    }

    fn set_parent_name(&mut self, parent: Option<String>) {
        self.parent = parent.map(|name| ParentRef { name });
    }
}
