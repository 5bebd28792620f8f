//! 性能统计 - 业务能力层
//!
//! 收集各阶段的事件计数和耗时，运行结束时落一份
//! `performance_report.json`。纯观测用途，流水线本身不读它。

use crate::cache::atomic_write_json;
use crate::error::AppResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::info;

/// 可累加的计数器
#[derive(Debug, Clone, Copy)]
pub enum Counter {
    TotalPapers,
    SuccessfulPapers,
    FailedPapers,
    SkippedPapers,
    TotalReferences,
    SuccessfulReferences,
    FailedReferences,
    MetadataFilesWritten,
    ReferencesFilesWritten,
    DownloadFailures,
    ExtractionFailures,
    SkippedBibCount,
    BytesBeforeFilter,
    BytesAfterFilter,
}

/// 运行统计报告（序列化形态）
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub total_time_seconds: f64,
    pub total_papers: u64,
    pub successful_papers: u64,
    pub failed_papers: u64,
    pub skipped_papers: u64,
    pub total_references: u64,
    pub successful_references: u64,
    pub failed_references: u64,
    pub metadata_files_written: u64,
    pub references_files_written: u64,
    pub download_failures: u64,
    pub extraction_failures: u64,
    pub skipped_bib_count: u64,
    pub bytes_before_filter: u64,
    pub bytes_after_filter: u64,
    pub stage_times: BTreeMap<String, f64>,
}

/// 性能监视器
///
/// 所有计数器都是原子量，各阶段并发累加；阶段耗时表由互斥锁
/// 保护。整个运行共享一个 `Arc<PerformanceMonitor>`。
pub struct PerformanceMonitor {
    started_at: Instant,
    total_papers: AtomicU64,
    successful_papers: AtomicU64,
    failed_papers: AtomicU64,
    skipped_papers: AtomicU64,
    total_references: AtomicU64,
    successful_references: AtomicU64,
    failed_references: AtomicU64,
    metadata_files_written: AtomicU64,
    references_files_written: AtomicU64,
    download_failures: AtomicU64,
    extraction_failures: AtomicU64,
    skipped_bib_count: AtomicU64,
    bytes_before_filter: AtomicU64,
    bytes_after_filter: AtomicU64,
    stage_times: Mutex<BTreeMap<String, f64>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_papers: AtomicU64::new(0),
            successful_papers: AtomicU64::new(0),
            failed_papers: AtomicU64::new(0),
            skipped_papers: AtomicU64::new(0),
            total_references: AtomicU64::new(0),
            successful_references: AtomicU64::new(0),
            failed_references: AtomicU64::new(0),
            metadata_files_written: AtomicU64::new(0),
            references_files_written: AtomicU64::new(0),
            download_failures: AtomicU64::new(0),
            extraction_failures: AtomicU64::new(0),
            skipped_bib_count: AtomicU64::new(0),
            bytes_before_filter: AtomicU64::new(0),
            bytes_after_filter: AtomicU64::new(0),
            stage_times: Mutex::new(BTreeMap::new()),
        }
    }

    fn cell(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::TotalPapers => &self.total_papers,
            Counter::SuccessfulPapers => &self.successful_papers,
            Counter::FailedPapers => &self.failed_papers,
            Counter::SkippedPapers => &self.skipped_papers,
            Counter::TotalReferences => &self.total_references,
            Counter::SuccessfulReferences => &self.successful_references,
            Counter::FailedReferences => &self.failed_references,
            Counter::MetadataFilesWritten => &self.metadata_files_written,
            Counter::ReferencesFilesWritten => &self.references_files_written,
            Counter::DownloadFailures => &self.download_failures,
            Counter::ExtractionFailures => &self.extraction_failures,
            Counter::SkippedBibCount => &self.skipped_bib_count,
            Counter::BytesBeforeFilter => &self.bytes_before_filter,
            Counter::BytesAfterFilter => &self.bytes_after_filter,
        }
    }

    /// 累加计数器
    pub fn add(&self, counter: Counter, value: u64) {
        self.cell(counter).fetch_add(value, Ordering::Relaxed);
    }

    /// 计数器加一
    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    /// 记录一个阶段的耗时
    pub fn record_stage_time(&self, stage_name: &str, seconds: f64) {
        if let Ok(mut times) = self.stage_times.lock() {
            times.insert(stage_name.to_string(), seconds);
        }
        info!("⏱️ 阶段 '{}' 耗时 {:.2}s", stage_name, seconds);
    }

    /// 生成统计报告
    pub fn summary(&self) -> RunReport {
        RunReport {
            total_time_seconds: self.started_at.elapsed().as_secs_f64(),
            total_papers: self.total_papers.load(Ordering::Relaxed),
            successful_papers: self.successful_papers.load(Ordering::Relaxed),
            failed_papers: self.failed_papers.load(Ordering::Relaxed),
            skipped_papers: self.skipped_papers.load(Ordering::Relaxed),
            total_references: self.total_references.load(Ordering::Relaxed),
            successful_references: self.successful_references.load(Ordering::Relaxed),
            failed_references: self.failed_references.load(Ordering::Relaxed),
            metadata_files_written: self.metadata_files_written.load(Ordering::Relaxed),
            references_files_written: self.references_files_written.load(Ordering::Relaxed),
            download_failures: self.download_failures.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            skipped_bib_count: self.skipped_bib_count.load(Ordering::Relaxed),
            bytes_before_filter: self.bytes_before_filter.load(Ordering::Relaxed),
            bytes_after_filter: self.bytes_after_filter.load(Ordering::Relaxed),
            stage_times: self
                .stage_times
                .lock()
                .map(|t| t.clone())
                .unwrap_or_default(),
        }
    }

    /// 写出报告文件
    pub fn write_report(&self, path: &Path) -> AppResult<()> {
        atomic_write_json(path, &self.summary())?;
        info!("📊 性能报告已保存至: {}", path.display());
        Ok(())
    }

    /// 打印最终统计
    pub fn log_summary(&self) {
        let report = self.summary();
        info!("{}", "=".repeat(60));
        info!("📊 运行统计");
        info!("{}", "=".repeat(60));
        info!(
            "总耗时: {:.2}s ({:.2} 分钟)",
            report.total_time_seconds,
            report.total_time_seconds / 60.0
        );
        info!(
            "✅ 论文: 成功 {}/{}，跳过 {}，失败 {}",
            report.successful_papers,
            report.total_papers,
            report.skipped_papers,
            report.failed_papers
        );
        info!(
            "🔗 引用: 共 {} 条（{} 条带 arXiv ID）",
            report.total_references, report.successful_references
        );
        info!(
            "💾 产出: metadata {} 份，references {} 份",
            report.metadata_files_written, report.references_files_written
        );
        if report.bytes_before_filter > 0 {
            info!(
                "🧹 体积: 过滤前 {:.2} MB → 过滤后 {:.2} MB",
                report.bytes_before_filter as f64 / (1024.0 * 1024.0),
                report.bytes_after_filter as f64 / (1024.0 * 1024.0)
            );
        }
        for (stage, seconds) in &report.stage_times {
            let pct = if report.total_time_seconds > 0.0 {
                seconds / report.total_time_seconds * 100.0
            } else {
                0.0
            };
            info!("  {}: {:.2}s ({:.1}%)", stage, seconds, pct);
        }
        info!("{}", "=".repeat(60));
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let monitor = PerformanceMonitor::new();
        monitor.incr(Counter::SuccessfulPapers);
        monitor.incr(Counter::SuccessfulPapers);
        monitor.add(Counter::BytesBeforeFilter, 1024);

        let report = monitor.summary();
        assert_eq!(report.successful_papers, 2);
        assert_eq!(report.bytes_before_filter, 1024);
        assert_eq!(report.failed_papers, 0);
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("performance_report.json");

        let monitor = PerformanceMonitor::new();
        monitor.record_stage_time("Stage 1: Metadata", 1.5);
        monitor.write_report(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["stage_times"]["Stage 1: Metadata"], 1.5);
    }
}
