//! 流水线数据模型
//!
//! 所有持久化记录的显式 schema。缓存与产出文件统一使用这些
//! 带标签的结构体，缺失字段用 `Option` 表示，不做动态 JSON 访问。

use serde::{Deserialize, Serialize};

/// 论文元数据记录
///
/// 由元数据阶段产出，一篇论文一条，写入缓存后当次运行内不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// arXiv 基础 ID（不带版本后缀）
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    /// 摘要（arXiv API 的 summary 字段）
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// 首次提交时间（ISO 8601）
    pub submitted_at: String,
    /// 各次修订时间（去重、保序）
    #[serde(default)]
    pub revised_ats: Vec<String>,
    /// 已发布的版本列表，驱动源码包下载
    #[serde(default)]
    pub versions: Vec<VersionDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_ref: Option<String>,
}

/// 单个已发布版本的描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    pub document_id: String,
    pub version_number: u32,
    /// 源码包下载地址
    pub source_url: String,
}

/// 引用目标的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// 目标有 arXiv ID，可以到本地快照中查元数据
    ArxivId,
    /// 目标只有外部数据库 ID（如 Semantic Scholar paperId）
    ExternalId,
    /// 无法解析出任何标识
    Unresolved,
}

/// 一条引用边
///
/// 由引用阶段产出，一篇论文多条。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationEdge {
    pub source_document_id: String,
    pub target_identifier: String,
    pub target_kind: TargetKind,
    /// 引用目标的标题（Semantic Scholar 提供时保留）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// 被引论文的元数据
///
/// 由本地快照查询阶段产出，按 arXiv ID 索引。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitedMetadata {
    pub target_identifier: String,
    /// 首次提交时间；快照中查不到时为 None，下游必须容忍缺失
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub revised_dates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_record_roundtrip() {
        let record = DocumentRecord {
            id: "2402.10011".to_string(),
            title: "Test Paper".to_string(),
            authors: vec!["Alice".to_string(), "Bob".to_string()],
            summary: None,
            submitted_at: "2024-02-15T00:00:00+00:00".to_string(),
            revised_ats: vec![],
            versions: vec![VersionDescriptor {
                document_id: "2402.10011".to_string(),
                version_number: 1,
                source_url: "https://arxiv.org/e-print/2402.10011v1".to_string(),
            }],
            journal_ref: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        // 摘要为 None 时不应出现在序列化结果里
        assert!(!json.contains("abstract"));
        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_target_kind_snake_case() {
        let edge = CitationEdge {
            source_document_id: "2402.10011".to_string(),
            target_identifier: "2001.00001".to_string(),
            target_kind: TargetKind::ArxivId,
            title: None,
        };
        let json = serde_json::to_string(&edge).unwrap();
        assert!(json.contains("\"arxiv_id\""));
    }

    #[test]
    fn test_cited_metadata_missing_date() {
        // 缺失 submission_date 的记录必须能正常反序列化
        let json = r#"{"target_identifier":"2001.00001"}"#;
        let meta: CitedMetadata = serde_json::from_str(json).unwrap();
        assert!(meta.submission_date.is_none());
        assert!(meta.revised_dates.is_empty());
    }
}
