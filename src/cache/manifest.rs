//! 下载清单
//!
//! 记录哪些版本的源码包已经完整处理完毕。清单条目只在版本的
//! 文件全部落到最终位置、临时目录删除之后才追加，因此：
//! **清单里有条目 ⇒ 该版本的文件一定以最终形态存在于磁盘上**。
//! 重跑时据此跳过已完成的版本。

use crate::cache::store::{CachePurpose, CacheStore};
use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// 版本下载状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// 该版本已完整下载、解压、搬运
    Completed,
    /// 该论文没有任何可下载的源码（占位文件已写入）
    NoSource,
}

/// 下载清单条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub document_id: String,
    /// 版本号；`NoSource` 条目固定为 0
    pub version_number: u32,
    pub status: DownloadStatus,
    /// 解压后（含图片等资源）的字节数
    pub byte_size_before: u64,
    /// 只保留文本源文件后的字节数
    pub byte_size_after: u64,
}

/// 下载清单（`downloads` 用途缓存的类型化视图）
#[derive(Clone)]
pub struct DownloadManifest {
    store: Arc<CacheStore>,
}

impl DownloadManifest {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// 清单键：`{id}_v{n}`
    pub fn key(document_id: &str, version: u32) -> String {
        format!("{}_v{}", document_id, version)
    }

    /// 读出全部已完成条目的键集合（阶段启动时做断点续传判断用）
    pub fn completed_keys(&self) -> HashSet<String> {
        self.load().into_keys().collect()
    }

    pub fn load(&self) -> HashMap<String, ManifestEntry> {
        self.store.load(CachePurpose::Downloads)
    }

    /// 追加一条已完成条目
    ///
    /// 通过缓存的 merge 语义追加：已存在的条目永远不会被改写。
    pub async fn record(&self, entry: ManifestEntry) -> AppResult<()> {
        let version = match entry.status {
            DownloadStatus::Completed => entry.version_number,
            DownloadStatus::NoSource => 0,
        };
        let mut delta = HashMap::new();
        delta.insert(Self::key(&entry.document_id, version), entry);
        self.store.merge(CachePurpose::Downloads, &delta).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manifest() -> (tempfile::TempDir, DownloadManifest) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CacheStore::new(dir.path(), "23127001").unwrap());
        (dir, DownloadManifest::new(store))
    }

    #[tokio::test]
    async fn test_record_and_resume() {
        let (_dir, manifest) = test_manifest();

        manifest
            .record(ManifestEntry {
                document_id: "2402.10011".to_string(),
                version_number: 1,
                status: DownloadStatus::Completed,
                byte_size_before: 1000,
                byte_size_after: 200,
            })
            .await
            .unwrap();

        let completed = manifest.completed_keys();
        assert!(completed.contains(&DownloadManifest::key("2402.10011", 1)));
        assert!(!completed.contains(&DownloadManifest::key("2402.10011", 2)));
    }

    /// 已完成的条目不会被后来的写入改写
    #[tokio::test]
    async fn test_completed_entry_never_rewritten() {
        let (_dir, manifest) = test_manifest();

        let original = ManifestEntry {
            document_id: "2402.10011".to_string(),
            version_number: 1,
            status: DownloadStatus::Completed,
            byte_size_before: 1000,
            byte_size_after: 200,
        };
        manifest.record(original.clone()).await.unwrap();

        let mut altered = original.clone();
        altered.byte_size_after = 999;
        manifest.record(altered).await.unwrap();

        let entries = manifest.load();
        assert_eq!(entries[&DownloadManifest::key("2402.10011", 1)], original);
    }

    #[tokio::test]
    async fn test_no_source_entry_keyed_v0() {
        let (_dir, manifest) = test_manifest();

        manifest
            .record(ManifestEntry {
                document_id: "2402.10011".to_string(),
                version_number: 0,
                status: DownloadStatus::NoSource,
                byte_size_before: 0,
                byte_size_after: 0,
            })
            .await
            .unwrap();

        assert!(manifest
            .completed_keys()
            .contains(&DownloadManifest::key("2402.10011", 0)));
    }
}
