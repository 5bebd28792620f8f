//! 源码包处理 - 业务能力层
//!
//! ## 职责
//! - 逐版本下载论文的 LaTeX 源码包（v1 起探测，直到 404 或上限）
//! - 解压 tar.gz（兼容单文件 gzip 的退化形态）
//! - 只保留 .tex/.bib 文本源文件，保持原目录结构搬运到最终位置
//! - 每个版本处理完毕后写下载清单，重跑时跳过已完成版本
//!
//! 清单写入永远在临时目录删除之后，保证"清单有条目 ⇒ 文件已就位"。

use crate::cache::{DownloadManifest, DownloadStatus, ManifestEntry};
use crate::clients::ArxivClient;
use crate::config::Config;
use crate::error::{AppResult, ArchiveError, FetchError};
use crate::models::ident;
use crate::services::report::{Counter, PerformanceMonitor};
use crate::utils::CancelFlag;
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 没有任何可下载源码时写入论文目录的占位文件名
const NO_SOURCE_PLACEHOLDER: &str = "NO_SOURCE_AVAILABLE.txt";

/// 单篇论文的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperOutcome {
    /// 至少新处理了一个版本
    Processed { new_versions: u32 },
    /// 所有版本都已在清单里（或论文早已标记无源码）
    Skipped,
    /// 处理过程出错，一个版本都没有落盘
    Failed,
}

/// 源码包字节的来源抽象
///
/// 生产实现是 [`ArxivClient`]；测试里用桩实现模拟各类下载结果。
pub trait SourceFetcher: Send + Sync + 'static {
    /// 下载指定版本的源码包；版本不存在返回 `NotFound`
    fn fetch_version(
        &self,
        paper_id: &str,
        version: u32,
    ) -> impl std::future::Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

impl SourceFetcher for ArxivClient {
    async fn fetch_version(&self, paper_id: &str, version: u32) -> Result<Vec<u8>, FetchError> {
        self.download_version(paper_id, version).await
    }
}

/// 源码包处理器
pub struct ArchiveProcessor<S: SourceFetcher> {
    source: Arc<S>,
    manifest: DownloadManifest,
    monitor: Arc<PerformanceMonitor>,
    cancel: CancelFlag,
    data_dir: PathBuf,
    max_versions: u32,
    skip_large_bib: bool,
    bib_threshold_bytes: u64,
}

impl<S: SourceFetcher> ArchiveProcessor<S> {
    pub fn new(
        source: Arc<S>,
        manifest: DownloadManifest,
        monitor: Arc<PerformanceMonitor>,
        cancel: CancelFlag,
        config: &Config,
    ) -> Self {
        Self {
            source,
            manifest,
            monitor,
            cancel,
            data_dir: PathBuf::from(&config.data_dir),
            max_versions: config.max_versions,
            skip_large_bib: config.skip_large_bib,
            bib_threshold_bytes: config.bib_threshold_bytes(),
        }
    }

    /// 论文的落盘目录（ID 中的 `.` 换成 `-`）
    pub fn paper_dir(&self, paper_id: &str) -> PathBuf {
        self.data_dir.join(ident::folder_name(paper_id))
    }

    /// 处理一篇论文的全部版本
    ///
    /// # 参数
    /// - `completed`: 启动时从清单读出的已完成键集合
    ///
    /// 版本从 v1 开始逐个探测，遇到 404 说明后面的版本也不存在，
    /// 停止探测。单个版本的失败不中断其余版本。
    pub async fn process_paper(&self, paper_id: &str, completed: &HashSet<String>) -> PaperOutcome {
        // 早已确认无源码的论文整体跳过
        if completed.contains(&DownloadManifest::key(paper_id, 0)) {
            debug!("📦 {} 已标记无源码，跳过", paper_id);
            return PaperOutcome::Skipped;
        }

        let paper_dir = self.paper_dir(paper_id);
        let mut new_versions = 0u32;
        let mut existing_versions = 0u32;
        let mut had_failure = false;

        for version in 1..=self.max_versions {
            if self.cancel.is_cancelled() {
                debug!("📦 {} 收到取消请求，不再发起新的下载", paper_id);
                break;
            }
            if completed.contains(&DownloadManifest::key(paper_id, version)) {
                existing_versions += 1;
                continue;
            }

            let bytes = match self.source.fetch_version(paper_id, version).await {
                Ok(bytes) => bytes,
                Err(FetchError::NotFound { .. }) => {
                    // 该版本不存在，后面的版本号也不会存在
                    debug!("📦 {} v{} 不存在，停止探测", paper_id, version);
                    break;
                }
                Err(e) => {
                    warn!("⚠️ {} v{} 下载失败: {}", paper_id, version, e);
                    self.monitor.incr(Counter::DownloadFailures);
                    had_failure = true;
                    continue;
                }
            };

            match self.install_version(paper_id, version, &bytes, &paper_dir).await {
                Ok(()) => new_versions += 1,
                Err(e) => {
                    warn!("⚠️ {} v{} 处理失败: {}", paper_id, version, e);
                    self.monitor.incr(Counter::ExtractionFailures);
                    had_failure = true;
                }
            }
        }

        if new_versions > 0 {
            info!(
                "✓ {} 源码处理完成: 新增 {} 个版本（已有 {} 个）",
                paper_id, new_versions, existing_versions
            );
            return PaperOutcome::Processed { new_versions };
        }
        if existing_versions > 0 {
            debug!("📦 {} 全部 {} 个版本已在清单里", paper_id, existing_versions);
            return PaperOutcome::Skipped;
        }
        if had_failure {
            return PaperOutcome::Failed;
        }
        if self.cancel.is_cancelled() {
            // 取消时一个版本都没探测过，不能据此断定无源码
            return PaperOutcome::Skipped;
        }

        // 一个版本都探测不到：写占位文件并在清单里记 NoSource
        match self.mark_no_source(paper_id, &paper_dir).await {
            Ok(()) => {
                info!("📦 {} 没有可下载的源码，已写占位文件", paper_id);
                PaperOutcome::Skipped
            }
            Err(e) => {
                warn!("⚠️ {} 占位文件写入失败: {}", paper_id, e);
                PaperOutcome::Failed
            }
        }
    }

    /// 解压、过滤、搬运一个版本，最后写清单
    async fn install_version(
        &self,
        paper_id: &str,
        version: u32,
        bytes: &[u8],
        paper_dir: &Path,
    ) -> AppResult<()> {
        let folder = ident::folder_name(paper_id);
        let workspace = paper_dir.join(format!("tmp_download_v{}", version));
        let extracted = workspace.join("extracted");
        let final_dir = paper_dir.join("tex").join(format!("{}v{}", folder, version));

        // 上次崩溃可能留下半截临时目录
        let _ = std::fs::remove_dir_all(&workspace);
        std::fs::create_dir_all(&extracted).map_err(|e| ArchiveError::WorkspaceFailed {
            path: extracted.display().to_string(),
            source: Box::new(e),
        })?;

        let result = self.extract_and_filter(paper_id, version, bytes, &extracted, &final_dir);

        // 无论成败都清掉临时目录；失败时顺带清掉残缺的最终目录
        let _ = std::fs::remove_dir_all(&workspace);
        let (size_before, size_after) = match result {
            Ok(sizes) => sizes,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&final_dir);
                return Err(e);
            }
        };

        self.monitor.add(Counter::BytesBeforeFilter, size_before);
        self.monitor.add(Counter::BytesAfterFilter, size_after);

        // 文件全部就位后才写清单
        self.manifest
            .record(ManifestEntry {
                document_id: paper_id.to_string(),
                version_number: version,
                status: DownloadStatus::Completed,
                byte_size_before: size_before,
                byte_size_after: size_after,
            })
            .await?;

        debug!(
            "✓ {} v{} 落盘: {} → {} 字节",
            paper_id, version, size_before, size_after
        );
        Ok(())
    }

    fn extract_and_filter(
        &self,
        paper_id: &str,
        version: u32,
        bytes: &[u8],
        extracted: &Path,
        final_dir: &Path,
    ) -> AppResult<(u64, u64)> {
        extract_archive(paper_id, version, bytes, extracted)?;
        let size_before = dir_size(extracted);

        let _ = std::fs::remove_dir_all(final_dir);
        let copied = self.copy_source_files(extracted, final_dir)?;
        let size_after = dir_size(final_dir);

        debug!(
            "📦 {} v{}: 保留 {} 个源文件",
            paper_id, version, copied
        );
        Ok((size_before, size_after))
    }

    /// 把解压目录里的 .tex/.bib 按原相对路径复制到最终目录
    fn copy_source_files(&self, extracted: &Path, final_dir: &Path) -> AppResult<usize> {
        let mut copied = 0;
        for file in collect_files(extracted) {
            let Some(ext) = file.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !ext.eq_ignore_ascii_case("tex") && !ext.eq_ignore_ascii_case("bib") {
                continue;
            }

            let byte_size = std::fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
            if self.skip_large_bib
                && ext.eq_ignore_ascii_case("bib")
                && byte_size > self.bib_threshold_bytes
            {
                warn!(
                    "⚠️ 跳过超大 .bib 文件 ({:.1} MB): {}",
                    byte_size as f64 / (1024.0 * 1024.0),
                    file.display()
                );
                self.monitor.incr(Counter::SkippedBibCount);
                continue;
            }

            let relative = file
                .strip_prefix(extracted)
                .map_err(|e| ArchiveError::CopyFailed {
                    path: file.display().to_string(),
                    source: Box::new(e),
                })?;
            let target = final_dir.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ArchiveError::CopyFailed {
                    path: parent.display().to_string(),
                    source: Box::new(e),
                })?;
            }
            std::fs::copy(&file, &target).map_err(|e| ArchiveError::CopyFailed {
                path: target.display().to_string(),
                source: Box::new(e),
            })?;
            copied += 1;
        }
        Ok(copied)
    }

    /// 写占位文件并记录 NoSource 条目
    async fn mark_no_source(&self, paper_id: &str, paper_dir: &Path) -> AppResult<()> {
        let tex_dir = paper_dir.join("tex").join(ident::folder_name(paper_id));
        std::fs::create_dir_all(&tex_dir).map_err(|e| ArchiveError::WorkspaceFailed {
            path: tex_dir.display().to_string(),
            source: Box::new(e),
        })?;
        let placeholder = tex_dir.join(NO_SOURCE_PLACEHOLDER);
        std::fs::write(
            &placeholder,
            format!("No LaTeX source available for {}\n", paper_id),
        )
        .map_err(|e| ArchiveError::CopyFailed {
            path: placeholder.display().to_string(),
            source: Box::new(e),
        })?;

        self.manifest
            .record(ManifestEntry {
                document_id: paper_id.to_string(),
                version_number: 0,
                status: DownloadStatus::NoSource,
                byte_size_before: 0,
                byte_size_after: 0,
            })
            .await
    }
}

/// 解压源码包到目标目录
///
/// arXiv 的 e-print 通常是 tar.gz；单文件投稿是裸 gzip 的 .tex。
/// 先按 tar.gz 解，tar 解不开就把 gunzip 结果当单个 .tex 落盘。
fn extract_archive(
    paper_id: &str,
    version: u32,
    bytes: &[u8],
    extracted: &Path,
) -> Result<(), ArchiveError> {
    let mut decompressed = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut decompressed)
        .map_err(|e| ArchiveError::ExtractionFailed {
            path: format!("{}v{}", paper_id, version),
            detail: format!("gzip 解压失败: {}", e),
        })?;

    let mut archive = tar::Archive::new(decompressed.as_slice());
    if archive.unpack(extracted).is_ok() {
        return Ok(());
    }

    // 不是 tar：当作单文件 gzip 源码
    let _ = std::fs::remove_dir_all(extracted);
    std::fs::create_dir_all(extracted).map_err(|e| ArchiveError::WorkspaceFailed {
        path: extracted.display().to_string(),
        source: Box::new(e),
    })?;
    let single = extracted.join(format!("{}v{}.tex", ident::folder_name(paper_id), version));
    std::fs::write(&single, &decompressed).map_err(|e| ArchiveError::CopyFailed {
        path: single.display().to_string(),
        source: Box::new(e),
    })?;
    Ok(())
}

/// 递归列出目录下的所有文件
fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files
}

/// 递归统计目录字节数
fn dir_size(dir: &Path) -> u64 {
    collect_files(dir)
        .iter()
        .filter_map(|f| std::fs::metadata(f).ok())
        .map(|m| m.len())
        .sum()
}
