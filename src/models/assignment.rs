//! 运行任务清单
//!
//! 外部分配服务产出一个 TOML 文件，描述本次运行的身份（run_id）
//! 和要处理的论文集合：要么是显式的 ID 列表，要么是一段
//! 月份 + 序号区间，由本模块展开成 ID 列表。

use crate::error::{AppError, AppResult, ConfigError};
use crate::models::ident;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// 区间展开的安全上限，超过即停止生成
const MAX_GENERATED_IDS: usize = 10_000;

/// 一次运行的任务清单
#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    /// 运行身份，用于隔离缓存文件和输出目录
    pub run_id: String,
    /// 显式的论文 ID 列表（优先于 range）
    #[serde(default)]
    pub papers: Vec<String>,
    /// 月份 + 序号区间
    #[serde(default)]
    pub range: Option<IdRange>,
}

/// 分配的论文编号区间
#[derive(Debug, Clone, Deserialize)]
pub struct IdRange {
    /// 起始月份（YYYY-MM）
    pub start_month: String,
    pub start_id: u32,
    /// 结束月份（YYYY-MM）
    pub end_month: String,
    pub end_id: u32,
}

impl Assignment {
    /// 解析出本次运行要处理的论文 ID 列表
    pub fn paper_ids(&self) -> Vec<String> {
        if !self.papers.is_empty() {
            return self.papers.iter().map(|p| ident::base_id(p).to_string()).collect();
        }
        match &self.range {
            Some(range) => expand_range(range),
            None => Vec::new(),
        }
    }
}

/// 从 TOML 文件加载任务清单
///
/// # 参数
/// - `path`: 清单文件路径
pub fn load_assignment(path: impl AsRef<Path>) -> AppResult<Assignment> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(ConfigError::AssignmentReadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })
    })?;
    let assignment: Assignment = toml::from_str(&content).map_err(|e| {
        AppError::Config(ConfigError::AssignmentParseFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })
    })?;
    info!("✓ 已加载任务清单: run_id={}", assignment.run_id);
    Ok(assignment)
}

/// 将月份区间展开为 arXiv ID 列表
///
/// 起始月取 start_id 起，结束月止于 end_id，中间月份取整月。
pub fn expand_range(range: &IdRange) -> Vec<String> {
    let mut paper_ids = Vec::new();

    let Some((start_year, start_mon)) = ident::parse_month(&range.start_month) else {
        warn!("⚠️ 起始月份格式无效: {}", range.start_month);
        return paper_ids;
    };
    let Some((end_year, end_mon)) = ident::parse_month(&range.end_month) else {
        warn!("⚠️ 结束月份格式无效: {}", range.end_month);
        return paper_ids;
    };

    let mut year = start_year;
    let mut mon = start_mon;

    while year < end_year || (year == end_year && mon <= end_mon) {
        let month_str = format!("{}-{:02}", year, mon);

        let id_start = if year == start_year && mon == start_mon {
            range.start_id
        } else {
            0
        };
        let id_end = if year == end_year && mon == end_mon {
            range.end_id
        } else {
            // 中间月份取满整月
            99_999
        };

        for seq in id_start..=id_end {
            paper_ids.push(ident::format_arxiv_id(&month_str, seq));
            if paper_ids.len() > MAX_GENERATED_IDS {
                warn!("⚠️ 展开的 ID 超过 {} 个，提前停止", MAX_GENERATED_IDS);
                return paper_ids;
            }
        }

        mon += 1;
        if mon > 12 {
            mon = 1;
            year += 1;
        }
    }

    info!("✓ 区间展开得到 {} 个论文 ID", paper_ids.len());
    paper_ids
}
