//! 阶段缓存 - 基础设施层
//!
//! 按 (run_id, 用途) 划分缓存文件，保证：
//! 1. **原子写入**：先写临时文件并 fsync，再一次 rename 替换，
//!    读者永远只会看到旧的完整内容或新的完整内容
//! 2. **合并不覆盖**：merge 只补充新 ID，已有结果不会被后来的
//!    部分重试冲掉
//! 3. **同键串行**：同一用途的写入在键级锁上排队，不同用途随意交错

use crate::error::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// 缓存的逻辑用途，每个用途一个独立文件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePurpose {
    /// 论文元数据
    Metadata,
    /// 引用边列表
    Citations,
    /// 被引论文元数据
    CitedMetadata,
    /// 源码包下载清单
    Downloads,
}

impl CachePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePurpose::Metadata => "metadata",
            CachePurpose::Citations => "citations",
            CachePurpose::CitedMetadata => "cited_metadata",
            CachePurpose::Downloads => "downloads",
        }
    }

    fn index(&self) -> usize {
        match self {
            CachePurpose::Metadata => 0,
            CachePurpose::Citations => 1,
            CachePurpose::CitedMetadata => 2,
            CachePurpose::Downloads => 3,
        }
    }
}

/// 阶段缓存
pub struct CacheStore {
    cache_dir: PathBuf,
    run_id: String,
    /// 键级锁，同一用途的读改写串行执行
    locks: [Mutex<()>; 4],
}

impl CacheStore {
    /// 创建缓存（目录不存在时自动建立）
    pub fn new(cache_dir: impl Into<PathBuf>, run_id: impl Into<String>) -> AppResult<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)
            .map_err(|e| AppError::cache_write_failed(cache_dir.display().to_string(), e))?;
        Ok(Self {
            cache_dir,
            run_id: run_id.into(),
            locks: Default::default(),
        })
    }

    /// 某个用途的缓存文件路径
    pub fn file_path(&self, purpose: CachePurpose) -> PathBuf {
        self.cache_dir
            .join(format!("{}_{}.json", self.run_id, purpose.as_str()))
    }

    /// 读取整个缓存
    ///
    /// 文件不存在返回空映射；文件损坏打警告后也按空映射处理
    /// （旧实现的行为：宁可重抓也不让损坏的缓存卡死整个运行）。
    pub fn load<T: DeserializeOwned>(&self, purpose: CachePurpose) -> HashMap<String, T> {
        let path = self.file_path(purpose);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => return HashMap::new(),
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!("⚠️ 缓存文件损坏，按空缓存处理 ({}): {}", path.display(), e);
                HashMap::new()
            }
        }
    }

    /// 合并增量到缓存
    ///
    /// 读当前内容、补充 delta 中的新 ID、原子写回；已存在的 ID
    /// 保持原值不动。整个读改写过程持有该用途的键级锁。
    ///
    /// # 返回
    /// 返回实际新增的条目数
    pub async fn merge<T: Serialize>(
        &self,
        purpose: CachePurpose,
        delta: &HashMap<String, T>,
    ) -> AppResult<usize> {
        let _guard = self.locks[purpose.index()].lock().await;

        let mut current: HashMap<String, serde_json::Value> = self.load(purpose);
        let mut inserted = 0;

        for (key, value) in delta {
            if current.contains_key(key) {
                continue;
            }
            current.insert(key.clone(), serde_json::to_value(value)?);
            inserted += 1;
        }

        if inserted > 0 {
            atomic_write_json(&self.file_path(purpose), &current)?;
        }

        debug!(
            "缓存 {} 合并完成: 新增 {} 条，共 {} 条",
            purpose.as_str(),
            inserted,
            current.len()
        );
        Ok(inserted)
    }
}

/// 原子写入 JSON 文件
///
/// 序列化到 `{path}.tmp`，flush + fsync 后 rename 到最终路径。
/// 中途崩溃时最终文件要么是旧的完整内容、要么是新的完整内容。
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::cache_write_failed(parent.display().to_string(), e))?;
    }

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    let payload = serde_json::to_vec_pretty(value)?;

    let mut file = std::fs::File::create(&tmp_path)
        .map_err(|e| AppError::cache_write_failed(tmp_path.display().to_string(), e))?;
    file.write_all(&payload)
        .map_err(|e| AppError::cache_write_failed(tmp_path.display().to_string(), e))?;
    file.flush()
        .map_err(|e| AppError::cache_write_failed(tmp_path.display().to_string(), e))?;
    file.sync_all()
        .map_err(|e| AppError::cache_write_failed(tmp_path.display().to_string(), e))?;
    drop(file);

    std::fs::rename(&tmp_path, path)
        .map_err(|e| AppError::cache_write_failed(path.display().to_string(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        value: u32,
    }

    fn test_store() -> (tempfile::TempDir, CacheStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), "23127001").unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_merge_and_load_roundtrip() {
        let (_dir, store) = test_store();

        let mut delta = HashMap::new();
        delta.insert("a".to_string(), Entry { value: 1 });
        delta.insert("b".to_string(), Entry { value: 2 });

        let inserted = store.merge(CachePurpose::Metadata, &delta).await.unwrap();
        assert_eq!(inserted, 2);

        let loaded: HashMap<String, Entry> = store.load(CachePurpose::Metadata);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["a"], Entry { value: 1 });
    }

    /// merge 只补充新 ID，已有结果不会被后来的部分重试冲掉
    #[tokio::test]
    async fn test_merge_never_clobbers_existing() {
        let (_dir, store) = test_store();

        let mut first = HashMap::new();
        first.insert("a".to_string(), Entry { value: 1 });
        store.merge(CachePurpose::Citations, &first).await.unwrap();

        let mut second = HashMap::new();
        second.insert("a".to_string(), Entry { value: 99 });
        second.insert("b".to_string(), Entry { value: 2 });
        let inserted = store.merge(CachePurpose::Citations, &second).await.unwrap();

        assert_eq!(inserted, 1);
        let loaded: HashMap<String, Entry> = store.load(CachePurpose::Citations);
        // 已有的 a 保持原值
        assert_eq!(loaded["a"], Entry { value: 1 });
        assert_eq!(loaded["b"], Entry { value: 2 });
    }

    /// 不同 run_id 的缓存文件互不碰撞
    #[test]
    fn test_cache_files_scoped_by_run() {
        let dir = tempfile::tempdir().unwrap();
        let store_a = CacheStore::new(dir.path(), "run-a").unwrap();
        let store_b = CacheStore::new(dir.path(), "run-b").unwrap();
        assert_ne!(
            store_a.file_path(CachePurpose::Metadata),
            store_b.file_path(CachePurpose::Metadata)
        );
    }

    /// 模拟崩溃留下的半截 .tmp 文件不影响已有缓存的读取
    #[tokio::test]
    async fn test_leftover_tmp_does_not_corrupt_cache() {
        let (_dir, store) = test_store();

        let mut delta = HashMap::new();
        delta.insert("a".to_string(), Entry { value: 1 });
        store.merge(CachePurpose::Metadata, &delta).await.unwrap();

        // 半截临时文件（崩溃现场）
        let path = store.file_path(CachePurpose::Metadata);
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        std::fs::write(PathBuf::from(tmp), b"{\"truncated").unwrap();

        let loaded: HashMap<String, Entry> = store.load(CachePurpose::Metadata);
        assert_eq!(loaded["a"], Entry { value: 1 });
    }

    /// 损坏的缓存文件按空缓存处理而不是报错
    #[test]
    fn test_malformed_cache_treated_as_empty() {
        let (_dir, store) = test_store();
        std::fs::write(store.file_path(CachePurpose::Metadata), b"not json").unwrap();
        let loaded: HashMap<String, Entry> = store.load(CachePurpose::Metadata);
        assert!(loaded.is_empty());
    }

    /// 原子写入成功后不留临时文件
    #[test]
    fn test_atomic_write_cleans_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        atomic_write_json(&path, &Entry { value: 7 }).unwrap();

        assert!(path.exists());
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
