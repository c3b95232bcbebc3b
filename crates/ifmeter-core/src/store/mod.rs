pub mod recovery;
pub mod registry;
pub mod summary;

pub use recovery::{PERSIST_DISABLED, RecoveryFile};
pub use registry::{
    InterfaceSelection, InterfaceUpdate, NewSource, Registry, SnapshotMerge, SourceHandle,
    SourceUpdate, parse_ip,
};
pub use summary::{InterfaceFilter, InterfaceStats, InterfaceSummary, SourceSummary};
