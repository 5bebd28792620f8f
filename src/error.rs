use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 远端抓取错误
    Fetch(FetchError),
    /// 缓存持久化错误
    Cache(CacheError),
    /// 源码包处理错误
    Archive(ArchiveError),
    /// 配置错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Fetch(e) => write!(f, "抓取错误: {}", e),
            AppError::Cache(e) => write!(f, "缓存错误: {}", e),
            AppError::Archive(e) => write!(f, "源码包错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Fetch(e) => Some(e),
            AppError::Cache(e) => Some(e),
            AppError::Archive(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 远端抓取错误
///
/// 重试策略以此分类为准：`RateLimited` 和 `Transient` 可以重试，
/// `NotFound` 和 `Malformed` 说明目标本身没有对应记录，永不重试。
#[derive(Debug)]
pub enum FetchError {
    /// 请求频率限制
    RateLimited {
        endpoint: String,
        retry_after: Option<u64>,
    },
    /// 暂时性故障（网络错误、5xx 等）
    Transient {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 目标不存在
    NotFound {
        endpoint: String,
    },
    /// 响应内容无法解析
    Malformed {
        endpoint: String,
        detail: String,
    },
}

impl FetchError {
    /// 该错误是否允许重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited { .. } | FetchError::Transient { .. }
        )
    }

    pub fn endpoint(&self) -> &str {
        match self {
            FetchError::RateLimited { endpoint, .. }
            | FetchError::Transient { endpoint, .. }
            | FetchError::NotFound { endpoint }
            | FetchError::Malformed { endpoint, .. } => endpoint,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::RateLimited {
                endpoint,
                retry_after,
            } => {
                write!(
                    f,
                    "请求频率限制 ({}), 建议等待: {:?}秒",
                    endpoint, retry_after
                )
            }
            FetchError::Transient { endpoint, source } => {
                write!(f, "暂时性请求失败 ({}): {}", endpoint, source)
            }
            FetchError::NotFound { endpoint } => {
                write!(f, "目标不存在: {}", endpoint)
            }
            FetchError::Malformed { endpoint, detail } => {
                write!(f, "响应无法解析 ({}): {}", endpoint, detail)
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Transient { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 缓存持久化错误
///
/// 只影响出错的那一次写入，磁盘上旧的完整内容仍然有效。
#[derive(Debug)]
pub enum CacheError {
    /// 读取缓存文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入缓存文件失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 序列化失败
    SerializeFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::ReadFailed { path, source } => {
                write!(f, "读取缓存失败 ({}): {}", path, source)
            }
            CacheError::WriteFailed { path, source } => {
                write!(f, "写入缓存失败 ({}): {}", path, source)
            }
            CacheError::SerializeFailed { path, source } => {
                write!(f, "缓存序列化失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::ReadFailed { source, .. }
            | CacheError::WriteFailed { source, .. }
            | CacheError::SerializeFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

/// 源码包处理错误
#[derive(Debug)]
pub enum ArchiveError {
    /// 解压失败（文件损坏或格式不对）
    ExtractionFailed {
        path: String,
        detail: String,
    },
    /// 文件搬运失败
    CopyFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 临时目录操作失败
    WorkspaceFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::ExtractionFailed { path, detail } => {
                write!(f, "解压失败 ({}): {}", path, detail)
            }
            ArchiveError::CopyFailed { path, source } => {
                write!(f, "复制文件失败 ({}): {}", path, source)
            }
            ArchiveError::WorkspaceFailed { path, source } => {
                write!(f, "临时目录操作失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveError::ExtractionFailed { .. } => None,
            ArchiveError::CopyFailed { source, .. }
            | ArchiveError::WorkspaceFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

/// 配置错误
///
/// 配置级错误在任何阶段启动之前就中止运行，是唯一的硬失败。
#[derive(Debug)]
pub enum ConfigError {
    /// 任务清单读取失败
    AssignmentReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 任务清单解析失败
    AssignmentParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 没有解析出任何论文 ID
    EmptyRunSet,
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::AssignmentReadFailed { path, source } => {
                write!(f, "任务清单读取失败 ({}): {}", path, source)
            }
            ConfigError::AssignmentParseFailed { path, source } => {
                write!(f, "任务清单解析失败 ({}): {}", path, source)
            }
            ConfigError::EmptyRunSet => {
                write!(f, "任务清单没有解析出任何论文 ID")
            }
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ========== 从常见错误类型转换 ==========

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError::Fetch(err)
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Cache(err)
    }
}

impl From<ArchiveError> for AppError {
    fn from(err: ArchiveError) -> Self {
        AppError::Archive(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Cache(CacheError::SerializeFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Cache(CacheError::WriteFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl FetchError {
    /// 创建暂时性错误
    pub fn transient(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FetchError::Transient {
            endpoint: endpoint.into(),
            source: Box::new(source),
        }
    }

    /// 创建响应解析错误
    pub fn malformed(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        FetchError::Malformed {
            endpoint: endpoint.into(),
            detail: detail.into(),
        }
    }

    /// 创建目标不存在错误
    pub fn not_found(endpoint: impl Into<String>) -> Self {
        FetchError::NotFound {
            endpoint: endpoint.into(),
        }
    }
}

impl AppError {
    /// 创建缓存写入错误
    pub fn cache_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Cache(CacheError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建缓存读取错误
    pub fn cache_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Cache(CacheError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        // 只有 RateLimited 和 Transient 允许重试
        assert!(FetchError::RateLimited {
            endpoint: "e".to_string(),
            retry_after: None
        }
        .is_retryable());
        assert!(FetchError::transient(
            "e",
            std::io::Error::new(std::io::ErrorKind::Other, "boom")
        )
        .is_retryable());
        assert!(!FetchError::not_found("e").is_retryable());
        assert!(!FetchError::malformed("e", "bad json").is_retryable());
    }
}
