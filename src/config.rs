/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 任务清单 TOML 文件路径
    pub assignment_file: String,
    /// 论文产出目录（按 run_id 再分子目录）
    pub data_dir: String,
    /// 阶段缓存目录
    pub cache_dir: String,
    /// 本地元数据快照路径（Kaggle 数据集，可选）
    pub snapshot_path: String,
    /// 测试模式：最多处理的论文数量
    pub max_papers: Option<usize>,
    /// 只处理单篇论文（覆盖任务清单的 ID 列表）
    pub single_paper: Option<String>,
    // --- 限速与重试 ---
    /// arXiv API 两次调用之间的最小间隔（毫秒）
    pub arxiv_api_delay_ms: u64,
    /// 引用 API 两次调用之间的最小间隔（毫秒）
    pub citation_api_delay_ms: u64,
    /// 单次请求的最大尝试次数
    pub max_retries: u32,
    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,
    // --- 并发 ---
    /// 源码包下载并发数
    pub download_workers: usize,
    /// 引用抓取并发数
    pub citation_workers: usize,
    /// 每篇论文最多探测的版本数
    pub max_versions: u32,
    // --- 大文件策略 ---
    /// 是否跳过超过阈值的 .bib 文件
    pub skip_large_bib: bool,
    /// .bib 文件大小阈值（MB）
    pub bib_threshold_mb: f64,
    // --- 远端地址 ---
    pub arxiv_api_url: String,
    pub arxiv_eprint_url: String,
    pub citation_api_url: String,
    /// 引用 API 密钥（可选）
    pub citation_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assignment_file: "assignment.toml".to_string(),
            data_dir: "data".to_string(),
            cache_dir: "cache".to_string(),
            snapshot_path: "dataset/arxiv-metadata-oai-snapshot.json".to_string(),
            max_papers: None,
            single_paper: None,
            arxiv_api_delay_ms: 3000,
            citation_api_delay_ms: 1000,
            max_retries: 3,
            retry_delay_ms: 2000,
            download_workers: 16,
            citation_workers: 4,
            max_versions: 20,
            skip_large_bib: true,
            bib_threshold_mb: 5.0,
            arxiv_api_url: "https://export.arxiv.org/api/query".to_string(),
            arxiv_eprint_url: "https://arxiv.org/e-print".to_string(),
            citation_api_url: "https://api.semanticscholar.org/graph/v1".to_string(),
            citation_api_key: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            assignment_file: std::env::var("ASSIGNMENT_FILE").unwrap_or(default.assignment_file),
            data_dir: std::env::var("DATA_DIR").unwrap_or(default.data_dir),
            cache_dir: std::env::var("CACHE_DIR").unwrap_or(default.cache_dir),
            snapshot_path: std::env::var("SNAPSHOT_PATH").unwrap_or(default.snapshot_path),
            max_papers: std::env::var("MAX_PAPERS").ok().and_then(|v| v.parse().ok()),
            single_paper: std::env::var("PAPER_ID").ok().filter(|v| !v.is_empty()),
            arxiv_api_delay_ms: std::env::var("ARXIV_API_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.arxiv_api_delay_ms),
            citation_api_delay_ms: std::env::var("CITATION_API_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.citation_api_delay_ms),
            max_retries: std::env::var("MAX_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_retries),
            retry_delay_ms: std::env::var("RETRY_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_delay_ms),
            download_workers: std::env::var("DOWNLOAD_WORKERS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.download_workers),
            citation_workers: std::env::var("CITATION_WORKERS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.citation_workers),
            max_versions: std::env::var("MAX_VERSIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_versions),
            skip_large_bib: std::env::var("SKIP_LARGE_BIB").ok().and_then(|v| v.parse().ok()).unwrap_or(default.skip_large_bib),
            bib_threshold_mb: std::env::var("BIB_THRESHOLD_MB").ok().and_then(|v| v.parse().ok()).unwrap_or(default.bib_threshold_mb),
            arxiv_api_url: std::env::var("ARXIV_API_URL").unwrap_or(default.arxiv_api_url),
            arxiv_eprint_url: std::env::var("ARXIV_EPRINT_URL").unwrap_or(default.arxiv_eprint_url),
            citation_api_url: std::env::var("CITATION_API_URL").unwrap_or(default.citation_api_url),
            citation_api_key: std::env::var("CITATION_API_KEY").ok().filter(|v| !v.is_empty()),
        }
    }

    /// .bib 文件大小阈值（字节）
    pub fn bib_threshold_bytes(&self) -> u64 {
        (self.bib_threshold_mb * 1024.0 * 1024.0) as u64
    }
}
