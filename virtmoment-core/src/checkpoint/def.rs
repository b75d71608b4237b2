//! Domain checkpoint definitions and their XML form.

use serde::{Deserialize, Serialize};

use crate::error::{MomentError, Result};
use crate::moment::MomentDef;
use crate::snapshot::ParentRef;

/// How a disk takes part in a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointType {
    /// Not tracked.
    No,
    /// Changes tracked in a dirty bitmap.
    #[default]
    Bitmap,
}

/// Per-disk checkpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointDisk {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@checkpoint", default)]
    pub checkpoint: CheckpointType,
    /// Bitmap name, defaults to the checkpoint name
    #[serde(rename = "@bitmap", default, skip_serializing_if = "Option::is_none")]
    pub bitmap: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckpointDisks {
    #[serde(rename = "disk", default)]
    pub disks: Vec<CheckpointDisk>,
}

impl CheckpointDisks {
    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }
}

/// Checkpoint definition, serialized as `<domaincheckpoint>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "domaincheckpoint")]
pub struct CheckpointDef {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
    #[serde(rename = "creationTime", default)]
    pub creation_time: i64,
    #[serde(default, skip_serializing_if = "CheckpointDisks::is_empty")]
    pub disks: CheckpointDisks,
}

impl CheckpointDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parent: None,
            creation_time: 0,
            disks: CheckpointDisks::default(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(ParentRef { name: parent.into() });
        self
    }

    /// Track `disk` with a bitmap named after the checkpoint.
    pub fn with_bitmap_disk(mut self, disk: impl Into<String>) -> Self {
        self.disks.disks.push(CheckpointDisk {
            name: disk.into(),
            checkpoint: CheckpointType::Bitmap,
            bitmap: None,
        });
        self
    }

    /// Fill in the creation time, a default name and default bitmap names.
    pub fn post_parse(&mut self) {
        self.creation_time = chrono::Utc::now().timestamp();
        if self.name.is_empty() {
            self.name = self.creation_time.to_string();
        }
        for disk in &mut self.disks.disks {
            if disk.checkpoint == CheckpointType::Bitmap && disk.bitmap.is_none() {
                disk.bitmap = Some(self.name.clone());
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(MomentError::InvalidDefinition(format!(
                "invalid checkpoint name '{}'",
                self.name
            )));
        }
        Ok(())
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    pub fn to_xml(&self) -> Result<String> {
        Ok(quick_xml::se::to_string(self)?)
    }
}

impl MomentDef for CheckpointDef {
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
