//! Domain snapshots on top of the generic moment tree.
//!
//! [`SnapshotObjList`] wraps a `MomentObjList<SnapshotDef>` and adds what
//! only snapshots have: state and location filters, the public flag
//! values, handle listing and the aggregate `<snapshots>` XML document.

mod def;
mod flags;
mod list;

pub use def::{
    DiskSource, DiskSpec, Disks, MemorySpec, ParentRef, SnapshotDef, SnapshotLocation,
    SnapshotState,
};
pub use flags::{SnapshotFilter, SnapshotListFlags, SNAPSHOT_FILTER_GROUPS};
pub use list::SnapshotObjList;
