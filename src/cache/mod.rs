pub mod manifest;
pub mod store;

pub use manifest::{DownloadManifest, DownloadStatus, ManifestEntry};
pub use store::{atomic_write_json, CachePurpose, CacheStore};
