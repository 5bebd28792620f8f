//! arXiv API 客户端
//!
//! 封装元数据查询（Atom feed）和源码包下载。两类调用共用同一个
//! 限速实例，元数据阶段和下载阶段并发时也不会违反 arXiv 的
//! 最小调用间隔。

use crate::clients::http::RateLimitedClient;
use crate::config::Config;
use crate::error::FetchError;
use crate::models::{ident, DocumentRecord, VersionDescriptor};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

const METADATA_ENDPOINT: &str = "arxiv:metadata";
const EPRINT_ENDPOINT: &str = "arxiv:e-print";

fn entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<entry>(.*?)</entry>").expect("entry 正则无效"))
}

fn field_re(field: &'static str, cell: &'static OnceLock<Regex>) -> &'static Regex {
    cell.get_or_init(|| {
        Regex::new(&format!(r"(?s)<{field}[^>]*>(.*?)</{field}>")).expect("字段正则无效")
    })
}

/// arXiv API 客户端
pub struct ArxivClient {
    client: RateLimitedClient,
    api_url: String,
    eprint_url: String,
}

impl ArxivClient {
    /// 创建新的 arXiv 客户端
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("arxiv_harvester/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client: RateLimitedClient::new(
                http,
                Duration::from_millis(config.arxiv_api_delay_ms),
                config.max_retries,
                Duration::from_millis(config.retry_delay_ms),
            ),
            api_url: config.arxiv_api_url.clone(),
            eprint_url: config.arxiv_eprint_url.clone(),
        }
    }

    /// 批量抓取元数据
    ///
    /// # 参数
    /// - `ids`: arXiv 基础 ID 列表（一批最多 100 个）
    ///
    /// # 返回
    /// 返回基础 ID 到元数据记录的映射；feed 中缺失的论文不会出现在结果里
    pub async fn get_batch_metadata(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, DocumentRecord>, FetchError> {
        let query = [
            ("id_list", ids.join(",")),
            ("max_results", ids.len().to_string()),
        ];
        let feed = self
            .client
            .get_text(METADATA_ENDPOINT, &self.api_url, &query)
            .await?;

        let records = self.parse_feed(&feed);
        debug!("批量查询 {} 个 ID，解析出 {} 条记录", ids.len(), records.len());
        Ok(records)
    }

    /// 下载指定版本的源码包
    ///
    /// 404 返回 `NotFound`，表示该版本（及之后的版本）不存在。
    pub async fn download_version(
        &self,
        paper_id: &str,
        version: u32,
    ) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}/{}v{}", self.eprint_url, paper_id, version);
        self.client.get_bytes(EPRINT_ENDPOINT, &url).await
    }

    /// 解析 Atom feed 为元数据记录
    ///
    /// 单条 entry 解析失败只跳过那一条，不影响同批的其他论文。
    fn parse_feed(&self, feed: &str) -> HashMap<String, DocumentRecord> {
        let mut records = HashMap::new();

        for entry_caps in entry_re().captures_iter(feed) {
            let entry = &entry_caps[1];
            match self.parse_entry(entry) {
                Some(record) => {
                    records.insert(record.id.clone(), record);
                }
                None => {
                    warn!("跳过无法解析的 feed entry");
                }
            }
        }

        records
    }

    fn parse_entry(&self, entry: &str) -> Option<DocumentRecord> {
        static ID_RE: OnceLock<Regex> = OnceLock::new();
        static TITLE_RE: OnceLock<Regex> = OnceLock::new();
        static PUBLISHED_RE: OnceLock<Regex> = OnceLock::new();
        static UPDATED_RE: OnceLock<Regex> = OnceLock::new();
        static SUMMARY_RE: OnceLock<Regex> = OnceLock::new();
        static NAME_RE: OnceLock<Regex> = OnceLock::new();
        static JOURNAL_RE: OnceLock<Regex> = OnceLock::new();

        let id_re =
            ID_RE.get_or_init(|| Regex::new(r"<id>[^<]*/abs/([^<]+)</id>").expect("id 正则无效"));

        // entry 的 <id> 形如 http://arxiv.org/abs/2402.10011v3
        let versioned_id = id_re.captures(entry)?.get(1)?.as_str().trim().to_string();
        let (base, latest_version) = ident::split_version(&versioned_id);
        let base = base.to_string();
        let latest_version = latest_version.unwrap_or(1);

        let title = field_re("title", &TITLE_RE)
            .captures(entry)
            .map(|c| normalize_text(&c[1]))?;
        let submitted_at = field_re("published", &PUBLISHED_RE)
            .captures(entry)
            .map(|c| c[1].trim().to_string())?;
        let updated = field_re("updated", &UPDATED_RE)
            .captures(entry)
            .map(|c| c[1].trim().to_string());
        let summary = field_re("summary", &SUMMARY_RE)
            .captures(entry)
            .map(|c| normalize_text(&c[1]))
            .filter(|s| !s.is_empty());
        let journal_ref = field_re("arxiv:journal_ref", &JOURNAL_RE)
            .captures(entry)
            .map(|c| normalize_text(&c[1]))
            .filter(|s| !s.is_empty());

        let authors: Vec<String> = field_re("name", &NAME_RE)
            .captures_iter(entry)
            .map(|c| c[1].trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();

        // 修订时间：updated 与 published 不同才算一次修订
        let revised_ats = match updated {
            Some(u) if u != submitted_at => vec![u],
            _ => vec![],
        };

        let versions = (1..=latest_version)
            .map(|v| VersionDescriptor {
                document_id: base.clone(),
                version_number: v,
                source_url: format!("{}/{}v{}", self.eprint_url, base, v),
            })
            .collect();

        Some(DocumentRecord {
            id: base,
            title,
            authors,
            summary,
            submitted_at,
            revised_ats,
            versions,
            journal_ref,
        })
    }
}

/// 去掉 Atom 文本中的换行缩进并还原转义字符
fn normalize_text(raw: &str) -> String {
    let unescaped = raw
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    unescaped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query</title>
  <entry>
    <id>http://arxiv.org/abs/2402.10011v2</id>
    <updated>2024-03-01T10:00:00Z</updated>
    <published>2024-02-15T12:30:00Z</published>
    <title>A Study of
      Wrapped Titles &amp; Entities</title>
    <summary>  This paper studies
      something interesting.
    </summary>
    <author><name>Alice Zhang</name></author>
    <author><name>Bob Li</name></author>
    <arxiv:journal_ref xmlns:arxiv="http://arxiv.org/schemas/atom">Nature 123</arxiv:journal_ref>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2402.10012v1</id>
    <updated>2024-02-16T09:00:00Z</updated>
    <published>2024-02-16T09:00:00Z</published>
    <title>Second Paper</title>
    <summary>Short.</summary>
    <author><name>Carol Wang</name></author>
  </entry>
</feed>"#;

    fn test_client() -> ArxivClient {
        ArxivClient::new(&Config::default())
    }

    #[test]
    fn test_parse_feed_basic_fields() {
        let records = test_client().parse_feed(SAMPLE_FEED);
        assert_eq!(records.len(), 2);

        let first = &records["2402.10011"];
        // 标题换行被折叠，实体被还原
        assert_eq!(first.title, "A Study of Wrapped Titles & Entities");
        assert_eq!(first.authors, vec!["Alice Zhang", "Bob Li"]);
        assert_eq!(first.submitted_at, "2024-02-15T12:30:00Z");
        assert_eq!(first.revised_ats, vec!["2024-03-01T10:00:00Z"]);
        assert_eq!(first.journal_ref.as_deref(), Some("Nature 123"));
    }

    #[test]
    fn test_parse_feed_versions_from_latest() {
        let records = test_client().parse_feed(SAMPLE_FEED);

        // v2 是最新版本 → 应枚举出 v1、v2 两个版本描述
        let first = &records["2402.10011"];
        assert_eq!(first.versions.len(), 2);
        assert_eq!(first.versions[1].version_number, 2);
        assert!(first.versions[1]
            .source_url
            .ends_with("/2402.10011v2"));

        let second = &records["2402.10012"];
        assert_eq!(second.versions.len(), 1);
        // published 与 updated 相同 → 没有修订记录
        assert!(second.revised_ats.is_empty());
    }

    #[test]
    fn test_parse_feed_skips_malformed_entry() {
        let feed = r#"<feed>
          <entry><title>no id here</title></entry>
          <entry>
            <id>http://arxiv.org/abs/2402.10013v1</id>
            <published>2024-02-17T00:00:00Z</published>
            <title>Valid</title>
          </entry>
        </feed>"#;
        let records = test_client().parse_feed(feed);
        // 缺 id 的 entry 被跳过，合法的那条保留
        assert_eq!(records.len(), 1);
        assert!(records.contains_key("2402.10013"));
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("a  b\n   c"), "a b c");
        assert_eq!(normalize_text("x &amp; y &lt;z&gt;"), "x & y <z>");
    }
}
