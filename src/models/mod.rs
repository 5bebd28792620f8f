pub mod assignment;
pub mod ident;
pub mod record;

pub use assignment::{load_assignment, Assignment, IdRange};
pub use record::{CitationEdge, CitedMetadata, DocumentRecord, TargetKind, VersionDescriptor};
