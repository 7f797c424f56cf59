//! Staged output and the atomic commit to disk

pub mod target;
pub mod writer;

pub use target::{EntryKind, FsTarget, Snapshot, WriteTarget};
pub use writer::{CommitReport, Materializer, OverwritePolicy, StagedFile};
