//! # arXiv 论文采集流水线
//!
//! 为一批指定的 arXiv 论文采集元数据、引用图谱和 LaTeX 源码，
//! 产出按论文分目录的 JSON 与源文件。
//!
//! ## 分层架构
//!
//! - **编排层** (`orchestrator`)：应用初始化、阶段并发调度、优雅退出
//! - **业务能力层** (`services`)：源码包处理、快照查询、引用合并、性能统计
//! - **客户端层** (`clients`)：限速重试的 HTTP 封装、arXiv / 引用 API
//! - **基础设施层** (`cache`)：原子写入、合并不覆盖的阶段缓存
//! - **数据层** (`models`)：显式 schema 的记录类型与任务清单
//!
//! 全部进度持久化在阶段缓存里，中断后重跑自动从断点继续。

pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::App;
