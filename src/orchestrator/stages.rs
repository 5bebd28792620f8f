//! 流水线阶段 - 编排层
//!
//! ## 职责
//! 四个阶段各自独立推进，只通过阶段缓存交换数据：
//! 1. **元数据阶段**：批量抓取论文元数据，写每篇的 metadata.json
//! 2. **引用阶段**：抓引用边，再从本地快照补被引论文元数据
//! 3. **源码阶段**：逐版本下载、解压、过滤源码包
//! 4. **合并阶段**：把引用边和被引元数据合并成 references.json
//!
//! 前三个阶段并发执行；合并阶段只读缓存，在前三个阶段之后运行。
//! 单篇论文的失败只影响它自己，其余论文照常推进。

use crate::cache::{CachePurpose, CacheStore, DownloadManifest};
use crate::cache::atomic_write_json;
use crate::clients::{ArxivClient, CitationClient};
use crate::config::Config;
use crate::error::{AppError, AppResult, FetchError};
use crate::models::{ident, CitationEdge, CitedMetadata, DocumentRecord};
use crate::services::archive::{ArchiveProcessor, PaperOutcome};
use crate::services::merger;
use crate::services::report::{Counter, PerformanceMonitor};
use crate::services::snapshot::SnapshotLookup;
use crate::utils::{logging, CancelFlag};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// 元数据批量查询的单批上限（arXiv API 限制）
const METADATA_BATCH_SIZE: usize = 100;

/// 引用阶段两次缓存合并之间处理的论文数
const CITATION_CHUNK_SIZE: usize = 50;

/// 各阶段共享的运行上下文
pub struct StageContext {
    pub config: Config,
    pub run_id: String,
    pub paper_ids: Vec<String>,
    pub arxiv: Arc<ArxivClient>,
    pub citations: Arc<CitationClient>,
    pub store: Arc<CacheStore>,
    pub monitor: Arc<PerformanceMonitor>,
    pub cancel: CancelFlag,
}

impl StageContext {
    /// 论文的落盘目录
    fn paper_dir(&self, paper_id: &str) -> PathBuf {
        PathBuf::from(&self.config.data_dir).join(ident::folder_name(paper_id))
    }
}

// ========== 阶段 1：元数据 ==========

/// 抓取全部论文的元数据并写 metadata.json
pub async fn metadata_stage(ctx: Arc<StageContext>) -> AppResult<()> {
    let cached: HashMap<String, DocumentRecord> = ctx.store.load(CachePurpose::Metadata);

    // 缓存命中的论文也要补齐缺失的 metadata.json（上次运行可能中断）
    for (paper_id, record) in &cached {
        let path = ctx.paper_dir(paper_id).join("metadata.json");
        if path.exists() {
            continue;
        }
        write_paper_metadata(&ctx, paper_id, record, &path);
    }

    let pending: Vec<String> = ctx
        .paper_ids
        .iter()
        .filter(|id| !cached.contains_key(*id))
        .cloned()
        .collect();
    log_metadata_start(ctx.paper_ids.len(), cached.len(), pending.len());

    for batch in pending.chunks(METADATA_BATCH_SIZE) {
        if ctx.cancel.is_cancelled() {
            warn!("⚠️ 收到取消请求，元数据阶段提前结束");
            break;
        }

        let records = match ctx.arxiv.get_batch_metadata(batch).await {
            Ok(records) => records,
            Err(e) => {
                error!("❌ 元数据批量查询失败（{} 个 ID）: {}", batch.len(), e);
                continue;
            }
        };

        for id in batch {
            if !records.contains_key(id) {
                warn!("⚠️ feed 中没有 {} 的记录", id);
            }
        }

        for (paper_id, record) in &records {
            let path = ctx.paper_dir(paper_id).join("metadata.json");
            write_paper_metadata(&ctx, paper_id, record, &path);
        }
        ctx.store.merge(CachePurpose::Metadata, &records).await?;
    }

    info!("✓ 元数据阶段完成");
    Ok(())
}

/// 写一篇论文的 metadata.json
///
/// 单篇写盘失败只影响这一篇：记失败后继续，缓存里的记录下次重跑再补。
fn write_paper_metadata(
    ctx: &StageContext,
    paper_id: &str,
    record: &DocumentRecord,
    path: &std::path::Path,
) {
    match atomic_write_json(path, record) {
        Ok(()) => {
            debug!("✓ {}: {}", paper_id, logging::truncate_text(&record.title, 60));
            ctx.monitor.incr(Counter::MetadataFilesWritten);
        }
        Err(e) => {
            error!("❌ {} 的 metadata.json 写入失败: {}", paper_id, e);
            ctx.monitor.incr(Counter::FailedPapers);
        }
    }
}

// ========== 阶段 2：引用 ==========

/// 抓取引用边，再从本地快照补被引论文元数据
pub async fn citation_stage(ctx: Arc<StageContext>) -> AppResult<()> {
    fetch_citation_edges(ctx.clone()).await?;
    cited_metadata_stage(ctx).await?;
    info!("✓ 引用阶段完成");
    Ok(())
}

async fn fetch_citation_edges(ctx: Arc<StageContext>) -> AppResult<()> {
    let cached: HashMap<String, Vec<CitationEdge>> = ctx.store.load(CachePurpose::Citations);
    let pending: Vec<String> = ctx
        .paper_ids
        .iter()
        .filter(|id| !cached.contains_key(*id))
        .cloned()
        .collect();
    info!(
        "🔗 引用抓取: 缓存命中 {} 篇，待抓取 {} 篇",
        cached.len(),
        pending.len()
    );

    let semaphore = Arc::new(Semaphore::new(ctx.config.citation_workers));

    for chunk in pending.chunks(CITATION_CHUNK_SIZE) {
        if ctx.cancel.is_cancelled() {
            warn!("⚠️ 收到取消请求，引用抓取提前结束");
            break;
        }

        let mut handles = Vec::new();
        for paper_id in chunk {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AppError::Other(e.to_string()))?;
            let ctx = ctx.clone();
            let paper_id = paper_id.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                match ctx.citations.get_references(&paper_id).await {
                    Ok(edges) => Some((paper_id, edges)),
                    Err(FetchError::NotFound { .. }) => {
                        // 引用库里没有这篇论文：记空列表，重跑时不再查
                        warn!("⚠️ {} 在引用库中不存在，记为无引用", paper_id);
                        Some((paper_id, Vec::new()))
                    }
                    Err(e) => {
                        error!("❌ {} 引用抓取失败: {}", paper_id, e);
                        None
                    }
                }
            }));
        }

        let mut delta: HashMap<String, Vec<CitationEdge>> = HashMap::new();
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(Some((paper_id, edges))) => {
                    ctx.monitor.add(Counter::TotalReferences, edges.len() as u64);
                    let resolved = edges
                        .iter()
                        .filter(|e| e.target_kind == crate::models::TargetKind::ArxivId)
                        .count();
                    ctx.monitor
                        .add(Counter::SuccessfulReferences, resolved as u64);
                    delta.insert(paper_id, edges);
                }
                Ok(None) => ctx.monitor.incr(Counter::FailedReferences),
                Err(e) => {
                    error!("❌ 引用任务执行失败: {}", e);
                    ctx.monitor.incr(Counter::FailedReferences);
                }
            }
        }

        // 每个块落一次缓存，中断时最多丢一个块的进度
        ctx.store.merge(CachePurpose::Citations, &delta).await?;
    }

    Ok(())
}

/// 从本地快照为被引论文补元数据
///
/// 快照文件不存在时打警告跳过，不影响其余阶段。
async fn cited_metadata_stage(ctx: Arc<StageContext>) -> AppResult<()> {
    let edges: HashMap<String, Vec<CitationEdge>> = ctx.store.load(CachePurpose::Citations);
    let cached: HashMap<String, CitedMetadata> = ctx.store.load(CachePurpose::CitedMetadata);

    let targets: HashSet<String> = edges
        .values()
        .flatten()
        .filter(|e| e.target_kind == crate::models::TargetKind::ArxivId)
        .map(|e| e.target_identifier.clone())
        .filter(|id| !cached.contains_key(id))
        .collect();

    if targets.is_empty() {
        info!("🔍 没有待查询的被引论文");
        return Ok(());
    }

    let lookup = SnapshotLookup::new(&ctx.config.snapshot_path);
    if !lookup.is_available() {
        return Ok(());
    }

    // 快照扫描是纯阻塞 IO，放到阻塞线程池里跑
    let found = tokio::task::spawn_blocking(move || lookup.lookup(&targets))
        .await
        .map_err(|e| AppError::Other(e.to_string()))??;

    ctx.store.merge(CachePurpose::CitedMetadata, &found).await?;
    Ok(())
}

// ========== 阶段 3：源码包 ==========

/// 下载并处理全部论文的源码包
pub async fn archive_stage(ctx: Arc<StageContext>) -> AppResult<()> {
    let manifest = DownloadManifest::new(ctx.store.clone());
    let processor = Arc::new(ArchiveProcessor::new(
        ctx.arxiv.clone(),
        manifest.clone(),
        ctx.monitor.clone(),
        ctx.cancel.clone(),
        &ctx.config,
    ));
    let completed = Arc::new(manifest.completed_keys());
    info!(
        "📦 源码阶段: 清单已有 {} 个版本，{} 篇论文待检查",
        completed.len(),
        ctx.paper_ids.len()
    );

    let semaphore = Arc::new(Semaphore::new(ctx.config.download_workers));
    let mut handles = Vec::new();

    for paper_id in &ctx.paper_ids {
        if ctx.cancel.is_cancelled() {
            warn!("⚠️ 收到取消请求，源码阶段提前结束");
            break;
        }

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::Other(e.to_string()))?;
        let processor = processor.clone();
        let completed = completed.clone();
        let paper_id = paper_id.clone();

        handles.push(tokio::spawn(async move {
            let _permit = permit;
            processor.process_paper(&paper_id, &completed).await
        }));
    }

    for joined in futures::future::join_all(handles).await {
        match joined {
            Ok(PaperOutcome::Processed { .. }) => ctx.monitor.incr(Counter::SuccessfulPapers),
            Ok(PaperOutcome::Skipped) => ctx.monitor.incr(Counter::SkippedPapers),
            Ok(PaperOutcome::Failed) => ctx.monitor.incr(Counter::FailedPapers),
            Err(e) => {
                error!("❌ 源码任务执行失败: {}", e);
                ctx.monitor.incr(Counter::FailedPapers);
            }
        }
    }

    info!("✓ 源码阶段完成");
    Ok(())
}

// ========== 阶段 4：合并 ==========

/// 合并引用边和被引元数据，写每篇论文的 references.json
///
/// 只处理元数据和引用边都已入缓存的论文。
pub async fn merge_stage(ctx: Arc<StageContext>) -> AppResult<()> {
    let metadata: HashMap<String, DocumentRecord> = ctx.store.load(CachePurpose::Metadata);
    let edges: HashMap<String, Vec<CitationEdge>> = ctx.store.load(CachePurpose::Citations);
    let cited: HashMap<String, CitedMetadata> = ctx.store.load(CachePurpose::CitedMetadata);

    let mut written = 0;
    for paper_id in &ctx.paper_ids {
        if !metadata.contains_key(paper_id) {
            continue;
        }
        let Some(paper_edges) = edges.get(paper_id) else {
            continue;
        };

        let merged = merger::merge_paper(paper_edges, &cited);
        let path = ctx.paper_dir(paper_id).join("references.json");
        // 单篇写盘失败不中断其余论文的合并
        if let Err(e) = merger::write_references(&path, &merged) {
            error!("❌ {} 的 references.json 写入失败: {}", paper_id, e);
            ctx.monitor.incr(Counter::FailedPapers);
            continue;
        }
        ctx.monitor.incr(Counter::ReferencesFilesWritten);
        written += 1;
    }

    info!("✓ 合并阶段完成: 写出 {} 份 references.json", written);
    Ok(())
}

// ========== 日志辅助函数 ==========

fn log_metadata_start(total: usize, cached: usize, pending: usize) {
    info!("📄 元数据阶段: 共 {} 篇", total);
    info!("✓ 缓存命中 {} 篇，待抓取 {} 篇", cached, pending);
}
