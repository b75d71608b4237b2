//! Domain checkpoints on top of the generic moment tree.

mod def;
mod list;

pub use def::{CheckpointDef, CheckpointDisk, CheckpointDisks, CheckpointType};
pub use list::{CheckpointListFlags, CheckpointObjList, CHECKPOINT_FILTER_GROUPS};
