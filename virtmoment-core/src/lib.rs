//! # virtmoment Core
//!
//! Snapshot and checkpoint trees for virtualization domains.
//!
//! Every domain owns a forest of moments (snapshots or checkpoints). Each
//! moment names its parent; the forest is rebuilt from those names after
//! loading and kept consistent through every deletion.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          SnapshotDriver Trait           │
//! │ (create_snapshot, list, revert, delete) │
//! └─────────────────────┬───────────────────┘
//!                       │
//!                       ▼
//!             ┌───────────────────┐     ┌───────────────────┐
//!             │    MockDriver     │────▶│   MetadataStore   │
//!             └─────────┬─────────┘     │ <dir>/<dom>/*.xml │
//!                       │               └───────────────────┘
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │  SnapshotObjList  │     │ CheckpointObjList │
//! └─────────┬─────────┘     └─────────┬─────────┘
//!           └─────────────┬───────────┘
//!                         ▼
//!               ┌───────────────────┐
//!               │  MomentObjList<D> │
//!               └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use virtmoment_core::{DomainRef, MockDriver, SnapshotDriver, SnapshotListFlags};
//!
//! #[tokio::main]
//! async fn main() {
//!     let driver = MockDriver::new();
//!     driver.define_domain(DomainRef::new("vm1")).await.unwrap();
//!
//!     let xml = "<domainsnapshot><name>before-upgrade</name></domainsnapshot>";
//!     driver.create_snapshot("vm1", xml, 0).await.unwrap();
//!
//!     let roots = driver.list("vm1", SnapshotListFlags::ROOTS.bits()).await.unwrap();
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod mock;
pub mod moment;
pub mod snapshot;
pub mod store;
pub mod traits;
pub mod types;

pub use checkpoint::{CheckpointDef, CheckpointListFlags, CheckpointObjList};
pub use config::MomentConfig;
pub use error::{MomentError, Result};
pub use mock::MockDriver;
pub use moment::{
    DeleteOutcome, DeletePolicy, MomentDef, MomentId, MomentListFlags, MomentObj, MomentObjList,
};
pub use snapshot::{SnapshotDef, SnapshotListFlags, SnapshotLocation, SnapshotObjList, SnapshotState};
pub use store::{MetadataStore, PersistedDef};
pub use traits::{SnapshotCreateFlags, SnapshotDeleteFlags, SnapshotDriver};
pub use types::*;
