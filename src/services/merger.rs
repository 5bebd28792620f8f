//! 引用合并 - 业务能力层
//!
//! 把引用边列表和被引论文元数据合并成每篇论文的 `references.json`。
//! 合并是纯函数：只给解析成功的 arXiv 目标附加提交时间，查不到
//! 的目标保持原样，绝不编造日期。

use crate::cache::atomic_write_json;
use crate::error::AppResult;
use crate::models::{CitationEdge, CitedMetadata, TargetKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// 合并后的单条引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedReference {
    pub target_identifier: String,
    pub target_kind: TargetKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 只有解析成功的 arXiv 目标才有提交时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub revised_dates: Vec<String>,
}

/// 合并一篇论文的引用边和被引元数据
///
/// # 参数
/// - `edges`: 该论文的引用边列表
/// - `cited`: 被引论文元数据（按目标 ID 索引，可能不含某些目标）
pub fn merge_paper(
    edges: &[CitationEdge],
    cited: &HashMap<String, CitedMetadata>,
) -> Vec<MergedReference> {
    edges
        .iter()
        .map(|edge| {
            let meta = match edge.target_kind {
                TargetKind::ArxivId => cited.get(&edge.target_identifier),
                // 非 arXiv 目标没有快照元数据可查
                _ => None,
            };
            MergedReference {
                target_identifier: edge.target_identifier.clone(),
                target_kind: edge.target_kind,
                title: edge
                    .title
                    .clone()
                    .or_else(|| meta.and_then(|m| m.title.clone())),
                submission_date: meta.and_then(|m| m.submission_date.clone()),
                revised_dates: meta.map(|m| m.revised_dates.clone()).unwrap_or_default(),
            }
        })
        .collect()
}

/// 原子写出一篇论文的 references.json
pub fn write_references(path: &Path, references: &[MergedReference]) -> AppResult<()> {
    atomic_write_json(path, &references)?;
    debug!("✓ 引用文件已写出: {} ({} 条)", path.display(), references.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(target: &str, kind: TargetKind, title: Option<&str>) -> CitationEdge {
        CitationEdge {
            source_document_id: "2402.10011".to_string(),
            target_identifier: target.to_string(),
            target_kind: kind,
            title: title.map(str::to_string),
        }
    }

    /// 解析成功的目标拿到日期，查不到的目标保持原样
    #[test]
    fn test_merge_attaches_dates_only_for_resolved_targets() {
        let edges = vec![
            edge("2001.00001", TargetKind::ArxivId, Some("Paper A")),
            edge("corpus:123", TargetKind::ExternalId, Some("Paper B")),
        ];
        let mut cited = HashMap::new();
        cited.insert(
            "2001.00001".to_string(),
            CitedMetadata {
                target_identifier: "2001.00001".to_string(),
                submission_date: Some("2020-01-01T00:00:00+00:00".to_string()),
                revised_dates: vec!["2020-01-01T00:00:00+00:00".to_string()],
                title: Some("Paper A".to_string()),
            },
        );

        let merged = merge_paper(&edges, &cited);
        assert_eq!(merged.len(), 2);

        let a = merged.iter().find(|r| r.target_identifier == "2001.00001").unwrap();
        assert_eq!(
            a.submission_date.as_deref(),
            Some("2020-01-01T00:00:00+00:00")
        );

        let b = merged.iter().find(|r| r.target_identifier == "corpus:123").unwrap();
        assert!(b.submission_date.is_none());
        assert_eq!(b.title.as_deref(), Some("Paper B"));
    }

    /// arXiv 目标在快照里没查到时也不编造日期
    #[test]
    fn test_merge_unresolved_arxiv_target_keeps_no_date() {
        let edges = vec![edge("9999.99999", TargetKind::ArxivId, None)];
        let merged = merge_paper(&edges, &HashMap::new());
        assert!(merged[0].submission_date.is_none());
        assert!(merged[0].revised_dates.is_empty());
    }

    /// 边上没有标题时用快照里的标题补
    #[test]
    fn test_merge_backfills_title_from_snapshot() {
        let edges = vec![edge("2001.00002", TargetKind::ArxivId, None)];
        let mut cited = HashMap::new();
        cited.insert(
            "2001.00002".to_string(),
            CitedMetadata {
                target_identifier: "2001.00002".to_string(),
                submission_date: None,
                revised_dates: vec![],
                title: Some("Snapshot Title".to_string()),
            },
        );
        let merged = merge_paper(&edges, &cited);
        assert_eq!(merged[0].title.as_deref(), Some("Snapshot Title"));
    }

    #[test]
    fn test_write_references_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("references.json");
        let merged = vec![MergedReference {
            target_identifier: "2001.00001".to_string(),
            target_kind: TargetKind::ArxivId,
            title: None,
            submission_date: None,
            revised_dates: vec![],
        }];

        write_references(&path, &merged).unwrap();
        let loaded: Vec<MergedReference> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, merged);
    }
}
