//! 应用主流程 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责流水线的初始化和阶段编排。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：加载任务清单、建目录、创建客户端和缓存
//! 2. **阶段编排**：元数据、引用、源码三个阶段并发推进
//! 3. **优雅退出**：Ctrl-C 置位取消标志，各阶段在工作项间收尾
//! 4. **全局统计**：汇总各阶段计数，落 performance_report.json
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单篇论文的细节，向下委托各阶段
//! - **失败隔离**：单个阶段出错只打日志，其余阶段照常收尾
//! - **幂等重跑**：全部进度都在缓存里，重跑自动跳过已完成部分

use crate::cache::CacheStore;
use crate::clients::{ArxivClient, CitationClient};
use crate::config::Config;
use crate::error::{AppError, AppResult, ConfigError};
use crate::models::assignment;
use crate::orchestrator::stages::{self, StageContext};
use crate::services::report::{Counter, PerformanceMonitor};
use crate::utils::{logging, CancelFlag};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    ctx: Arc<StageContext>,
}

impl App {
    /// 初始化应用
    ///
    /// 任务清单解析不出任何论文 ID 时直接报错中止，这是唯一的
    /// 硬失败；之后的所有错误都只影响单篇论文或单个阶段。
    pub async fn initialize(config: Config) -> AppResult<Self> {
        let assignment = assignment::load_assignment(&config.assignment_file)?;
        let run_id = assignment.run_id.clone();

        let mut paper_ids = match &config.single_paper {
            // 单篇模式：覆盖任务清单里的 ID 集合
            Some(id) => {
                info!("🔍 单篇模式: 只处理 {}", id);
                vec![crate::models::ident::base_id(id).to_string()]
            }
            None => assignment.paper_ids(),
        };
        if let Some(cap) = config.max_papers {
            if paper_ids.len() > cap {
                warn!("⚠️ 测试模式: 只处理前 {} 篇（共 {} 篇）", cap, paper_ids.len());
                paper_ids.truncate(cap);
            }
        }
        if paper_ids.is_empty() {
            return Err(AppError::Config(ConfigError::EmptyRunSet));
        }

        std::fs::create_dir_all(&config.data_dir)?;
        let store = Arc::new(CacheStore::new(&config.cache_dir, &run_id)?);

        logging::log_startup(&run_id, paper_ids.len());
        log_config(&config);

        let monitor = Arc::new(PerformanceMonitor::new());
        monitor.add(Counter::TotalPapers, paper_ids.len() as u64);

        Ok(Self {
            ctx: Arc::new(StageContext {
                arxiv: Arc::new(ArxivClient::new(&config)),
                citations: Arc::new(CitationClient::new(&config)),
                store,
                monitor,
                cancel: CancelFlag::new(),
                run_id,
                paper_ids,
                config,
            }),
        })
    }

    /// 运行流水线主逻辑
    pub async fn run(&self) -> AppResult<()> {
        self.spawn_ctrl_c_watcher();

        // 前三个阶段并发推进，互相只通过缓存交换数据
        let handles = [
            ("Stage 1: Metadata", self.spawn_stage("Stage 1: Metadata", stages::metadata_stage)),
            ("Stage 2: Citations", self.spawn_stage("Stage 2: Citations", stages::citation_stage)),
            ("Stage 3: Archives", self.spawn_stage("Stage 3: Archives", stages::archive_stage)),
        ];

        let mut stage_failures = 0;
        for (stage_name, handle) in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("❌ {} 失败: {}", stage_name, e);
                    stage_failures += 1;
                }
                Err(e) => {
                    error!("❌ {} 任务执行失败: {}", stage_name, e);
                    stage_failures += 1;
                }
            }
        }

        // 合并阶段只读缓存，即使上面有阶段失败也尽量产出
        logging::log_stage_start("Stage 4: Merge");
        let merge_started = Instant::now();
        if let Err(e) = stages::merge_stage(self.ctx.clone()).await {
            error!("❌ Stage 4: Merge 失败: {}", e);
            stage_failures += 1;
        }
        self.ctx
            .monitor
            .record_stage_time("Stage 4: Merge", merge_started.elapsed().as_secs_f64());

        self.write_report();
        self.ctx.monitor.log_summary();

        if self.ctx.cancel.is_cancelled() {
            warn!("⚠️ 运行被用户中断，进度已保存，重跑将从断点继续");
        }
        if stage_failures > 0 {
            return Err(AppError::Other(format!("{} 个阶段未正常完成", stage_failures)));
        }
        Ok(())
    }

    /// 启动一个阶段任务并记录耗时
    fn spawn_stage<F, Fut>(
        &self,
        stage_name: &'static str,
        stage: F,
    ) -> tokio::task::JoinHandle<AppResult<()>>
    where
        F: FnOnce(Arc<StageContext>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = AppResult<()>> + Send + 'static,
    {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            logging::log_stage_start(stage_name);
            let started = Instant::now();
            let result = stage(ctx.clone()).await;
            ctx.monitor
                .record_stage_time(stage_name, started.elapsed().as_secs_f64());
            result
        })
    }

    /// Ctrl-C 置位取消标志，各阶段在工作项之间自行收尾
    fn spawn_ctrl_c_watcher(&self) {
        let cancel = self.ctx.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("⚠️ 收到 Ctrl-C，正在优雅退出（再次 Ctrl-C 强制终止）");
                cancel.cancel();
            }
        });
    }

    fn write_report(&self) {
        let path = PathBuf::from(&self.ctx.config.data_dir).join("performance_report.json");
        if let Err(e) = self.ctx.monitor.write_report(&path) {
            error!("❌ 性能报告写入失败: {}", e);
        }
    }
}

// ========== 日志辅助函数 ==========

fn log_config(config: &Config) {
    info!("📊 下载并发: {} / 引用并发: {}", config.download_workers, config.citation_workers);
    info!(
        "📊 API 间隔: arXiv {}ms / 引用 {}ms，最多重试 {} 次",
        config.arxiv_api_delay_ms, config.citation_api_delay_ms, config.max_retries
    );
    info!("📁 产出目录: {} / 缓存目录: {}", config.data_dir, config.cache_dir);
}
