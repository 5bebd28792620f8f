//! 本地快照查询 - 业务能力层
//!
//! 在 Kaggle 的 arXiv 元数据快照（行分隔 JSON，数 GB）里查被引
//! 论文的元数据，整次运行只扫一遍文件，不发任何网络请求。
//! 快照文件不存在时组件自报不可用，由上层降级跳过该阶段。

use crate::error::AppResult;
use crate::models::CitedMetadata;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// 本地快照查询
pub struct SnapshotLookup {
    snapshot_path: PathBuf,
}

impl SnapshotLookup {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
        }
    }

    /// 快照文件是否就位
    pub fn is_available(&self) -> bool {
        let available = self.snapshot_path.exists();
        if !available {
            warn!(
                "⚠️ 本地快照不存在: {}，被引元数据阶段将被跳过",
                self.snapshot_path.display()
            );
            info!("💡 快照可从 https://www.kaggle.com/datasets/Cornell-University/arxiv 下载");
        }
        available
    }

    /// 为一组目标 ID 查元数据
    ///
    /// 整个快照只顺序扫描一遍；找齐所有目标后提前退出。快照里
    /// 查不到的 ID 不会出现在结果里，由下游按"未解析"处理。
    pub fn lookup(&self, targets: &HashSet<String>) -> AppResult<HashMap<String, CitedMetadata>> {
        let mut found = HashMap::new();
        if targets.is_empty() {
            return Ok(found);
        }

        let file = std::fs::File::open(&self.snapshot_path).map_err(|e| {
            crate::error::AppError::cache_read_failed(self.snapshot_path.display().to_string(), e)
        })?;
        // 快照文件很大，放大缓冲减少系统调用
        let reader = BufReader::with_capacity(8 * 1024 * 1024, file);

        let mut remaining: HashSet<String> = targets.clone();
        let started = Instant::now();
        let mut lines_read: u64 = 0;

        info!("📖 开始扫描本地快照，目标 {} 个 ID", targets.len());

        for line in reader.lines() {
            let Ok(line) = line else { continue };
            lines_read += 1;

            if lines_read % 100_000 == 0 {
                debug!(
                    "已扫描 {} 行，找到 {}/{} 个目标",
                    lines_read,
                    found.len(),
                    targets.len()
                );
            }

            // 绝大多数行都不是目标，先做一次廉价的前缀检查再解析 JSON
            if !line.get(..16).map_or(line.contains("\"id\""), |p| p.contains("\"id\"")) {
                continue;
            }

            let Ok(record) = serde_json::from_str::<Value>(&line) else {
                // 坏行直接跳过
                continue;
            };
            let Some(paper_id) = record.get("id").and_then(|v| v.as_str()) else {
                continue;
            };

            if !remaining.contains(paper_id) {
                continue;
            }

            let meta = build_cited_metadata(paper_id, &record);
            remaining.remove(paper_id);
            found.insert(paper_id.to_string(), meta);

            if remaining.is_empty() {
                info!("✓ 全部 {} 个目标已找到，提前结束扫描", targets.len());
                break;
            }
        }

        info!(
            "✓ 快照扫描完成: 扫描 {} 行，命中 {}/{} 个目标，耗时 {:.1}s",
            lines_read,
            found.len(),
            targets.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(found)
    }
}

/// 从快照记录构造被引元数据
///
/// 快照里的日期是 RFC 2822 格式（`Thu, 18 May 2023 17:35:35 GMT`），
/// 统一转成 ISO 8601；转换失败时保留原文。
fn build_cited_metadata(paper_id: &str, record: &Value) -> CitedMetadata {
    let mut revised_dates = Vec::new();
    if let Some(versions) = record.get("versions").and_then(|v| v.as_array()) {
        for version in versions {
            if let Some(created) = version.get("created").and_then(|v| v.as_str()) {
                if !created.is_empty() {
                    revised_dates.push(to_iso_date(created));
                }
            }
        }
    }

    let title = record
        .get("title")
        .and_then(|v| v.as_str())
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty());

    CitedMetadata {
        target_identifier: paper_id.to_string(),
        submission_date: revised_dates.first().cloned(),
        revised_dates,
        title,
    }
}

fn to_iso_date(raw: &str) -> String {
    match chrono::DateTime::parse_from_rfc2822(raw) {
        Ok(dt) => dt.to_rfc3339(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_snapshot(lines: &[&str]) -> (tempfile::TempDir, SnapshotLookup) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        (dir, SnapshotLookup::new(path))
    }

    #[test]
    fn test_lookup_finds_targets_and_reports_unresolved() {
        let (_dir, lookup) = write_snapshot(&[
            r#"{"id":"2001.00001","title":"Cited  One","versions":[{"version":"v1","created":"Thu, 18 May 2023 17:35:35 GMT"}]}"#,
            r#"{"id":"2001.00002","title":"Other","versions":[]}"#,
            "not json at all",
        ]);

        let targets: HashSet<String> =
            ["2001.00001".to_string(), "9999.99999".to_string()].into();
        let found = lookup.lookup(&targets).unwrap();

        // 命中的目标带上 ISO 格式的提交时间
        assert_eq!(found.len(), 1);
        let meta = &found["2001.00001"];
        assert_eq!(meta.title.as_deref(), Some("Cited One"));
        assert!(meta.submission_date.as_deref().unwrap().starts_with("2023-05-18"));
        // 快照里没有的目标不出现在结果里
        assert!(!found.contains_key("9999.99999"));
    }

    #[test]
    fn test_lookup_missing_dates_tolerated() {
        let (_dir, lookup) = write_snapshot(&[r#"{"id":"2001.00003","title":"No Versions"}"#]);

        let targets: HashSet<String> = [String::from("2001.00003")].into();
        let found = lookup.lookup(&targets).unwrap();
        assert!(found["2001.00003"].submission_date.is_none());
    }

    #[test]
    fn test_unavailable_when_file_missing() {
        let lookup = SnapshotLookup::new("/nonexistent/snapshot.json");
        assert!(!lookup.is_available());
        // 没有快照时查询返回错误（上层应先检查 is_available）
        let targets: HashSet<String> = [String::from("2001.00001")].into();
        assert!(lookup.lookup(&targets).is_err());
    }

    #[test]
    fn test_to_iso_date_keeps_unparseable() {
        assert_eq!(to_iso_date("garbage date"), "garbage date");
    }
}
