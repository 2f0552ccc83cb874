pub mod collect;
pub mod snapshot;

pub use collect::CollectSink;
pub use snapshot::SnapshotSink;
