pub mod archive;
pub mod merger;
pub mod report;
pub mod snapshot;

pub use archive::{ArchiveProcessor, PaperOutcome, SourceFetcher};
pub use merger::{merge_paper, write_references, MergedReference};
pub use report::{Counter, PerformanceMonitor, RunReport};
pub use snapshot::SnapshotLookup;
