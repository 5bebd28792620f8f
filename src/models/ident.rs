//! arXiv ID 工具函数
//!
//! 处理 arXiv 论文编号的格式转换：
//! - `2402.10011` → 文件夹名 `2402-10011`
//! - `2402.10011v3` → 基础 ID + 版本号
//! - 月份 `2024-02` + 序号 → `2402.00001`

use regex::Regex;
use std::sync::OnceLock;

/// 匹配带版本后缀的 arXiv ID（如 `2402.10011v3`）
fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<base>.+?)v(?P<num>\d+)$").expect("版本正则无效"))
}

/// 从 arXiv ID 生成文件夹名
///
/// # 参数
/// - `arxiv_id`: arXiv ID（如 `2402.10011`）
///
/// # 返回
/// 返回文件夹名（如 `2402-10011`）
pub fn folder_name(arxiv_id: &str) -> String {
    arxiv_id.replace('.', "-")
}

/// 去掉 ID 末尾的版本后缀
///
/// `2402.10011v3` → (`2402.10011`, Some(3))；无后缀时版本为 None
pub fn split_version(arxiv_id: &str) -> (&str, Option<u32>) {
    if let Some(caps) = version_re().captures(arxiv_id) {
        let base = caps.name("base").map(|m| m.as_str()).unwrap_or(arxiv_id);
        let num = caps.name("num").and_then(|m| m.as_str().parse().ok());
        if num.is_some() {
            return (base, num);
        }
    }
    (arxiv_id, None)
}

/// 去掉版本后缀，只保留基础 ID
pub fn base_id(arxiv_id: &str) -> &str {
    split_version(arxiv_id).0
}

/// 由月份和序号构造 arXiv ID
///
/// # 参数
/// - `month`: 月份（`YYYY-MM` 格式，如 `2024-02`）
/// - `seq`: 当月论文序号
///
/// # 返回
/// 返回格式化的 arXiv ID（如 `2402.10011`）
pub fn format_arxiv_id(month: &str, seq: u32) -> String {
    let parts: Vec<&str> = month.split('-').collect();
    let year = parts.first().map(|y| &y[y.len().saturating_sub(2)..]).unwrap_or("");
    let month_num = parts.get(1).copied().unwrap_or("");
    format!("{}{}.{:05}", year, month_num, seq)
}

/// 解析 `YYYY-MM` 格式的月份
pub fn parse_month(month: &str) -> Option<(i32, u32)> {
    let (y, m) = month.split_once('-')?;
    Some((y.parse().ok()?, m.parse().ok()?))
}
