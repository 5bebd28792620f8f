//! 引用图谱 API 客户端（Semantic Scholar）
//!
//! 按论文抓取引用列表，解析成带类别标签的引用边。

use crate::clients::http::RateLimitedClient;
use crate::config::Config;
use crate::error::FetchError;
use crate::models::{CitationEdge, TargetKind};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const REFERENCES_ENDPOINT: &str = "citations:references";

/// 要求 API 返回的引用字段
const REFERENCE_FIELDS: &str =
    "references.paperId,references.externalIds,references.title,references.publicationDate";

/// 引用图谱客户端
pub struct CitationClient {
    client: RateLimitedClient,
    base_url: String,
}

impl CitationClient {
    /// 创建新的引用客户端
    ///
    /// 配置了 API 密钥时放入默认请求头，所有请求自动携带。
    pub fn new(config: &Config) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.citation_api_key {
            if let Ok(value) = HeaderValue::from_str(key) {
                headers.insert("x-api-key", value);
            }
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client: RateLimitedClient::new(
                http,
                Duration::from_millis(config.citation_api_delay_ms),
                config.max_retries,
                Duration::from_millis(config.retry_delay_ms),
            ),
            base_url: config.citation_api_url.clone(),
        }
    }

    /// 抓取一篇论文的引用边列表
    ///
    /// 404 返回 `NotFound`，调用方应记录为"该论文无引用数据"。
    pub async fn get_references(&self, paper_id: &str) -> Result<Vec<CitationEdge>, FetchError> {
        let url = format!("{}/paper/arXiv:{}", self.base_url, paper_id);
        let query = [("fields", REFERENCE_FIELDS.to_string())];

        let data = self
            .client
            .get_json(REFERENCES_ENDPOINT, &url, &query)
            .await?;

        let edges = parse_references(paper_id, &data);
        debug!(
            "论文 {} 共 {} 条引用（{} 条带 arXiv ID）",
            paper_id,
            edges.len(),
            edges
                .iter()
                .filter(|e| e.target_kind == TargetKind::ArxivId)
                .count()
        );
        Ok(edges)
    }
}

/// 把 API 响应解析成引用边
///
/// 类别判定：有 arXiv 外部 ID → `arxiv_id`；否则有 paperId →
/// `external_id`；两者都没有 → `unresolved`（标识用标题兜底）。
pub fn parse_references(source_id: &str, data: &Value) -> Vec<CitationEdge> {
    let Some(refs) = data.get("references").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut edges = Vec::new();
    for reference in refs {
        let title = reference
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        let arxiv_id = reference
            .get("externalIds")
            .and_then(|v| v.get("ArXiv"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());

        let (target_identifier, target_kind) = if let Some(id) = arxiv_id {
            (id.to_string(), TargetKind::ArxivId)
        } else if let Some(paper_id) = reference
            .get("paperId")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        {
            (paper_id.to_string(), TargetKind::ExternalId)
        } else if let Some(t) = &title {
            (t.clone(), TargetKind::Unresolved)
        } else {
            // 连标题都没有的引用条目没有任何信息量，丢弃
            continue;
        };

        edges.push(CitationEdge {
            source_document_id: source_id.to_string(),
            target_identifier,
            target_kind,
            title,
        });
    }

    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_references_kinds() {
        let data = json!({
            "paperId": "abc",
            "references": [
                {
                    "paperId": "s2-1",
                    "title": "ArXiv Cited Paper",
                    "externalIds": { "ArXiv": "2001.00001", "DOI": "10.1/x" }
                },
                {
                    "paperId": "s2-2",
                    "title": "External Only",
                    "externalIds": { "DOI": "10.1/y" }
                },
                {
                    "paperId": null,
                    "title": "Orphan Reference",
                    "externalIds": null
                }
            ]
        });

        let edges = parse_references("2402.10011", &data);
        assert_eq!(edges.len(), 3);

        assert_eq!(edges[0].target_kind, TargetKind::ArxivId);
        assert_eq!(edges[0].target_identifier, "2001.00001");
        assert_eq!(edges[0].source_document_id, "2402.10011");

        assert_eq!(edges[1].target_kind, TargetKind::ExternalId);
        assert_eq!(edges[1].target_identifier, "s2-2");

        assert_eq!(edges[2].target_kind, TargetKind::Unresolved);
        assert_eq!(edges[2].target_identifier, "Orphan Reference");
    }

    #[test]
    fn test_parse_references_empty_payload() {
        // 响应里没有 references 字段时返回空列表而不是报错
        let data = json!({ "paperId": "abc" });
        assert!(parse_references("2402.10011", &data).is_empty());
    }
}
