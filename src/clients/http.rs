//! 限速重试客户端 - 基础设施层
//!
//! 每个远端数据源持有一个实例，保证：
//! 1. **限速**：同一实例的两次调用之间至少间隔配置的最小延迟，
//!    并发调用者在锁上排队，不会违反间隔约束
//! 2. **有界重试**：`Transient` / `RateLimited` 按固定间隔重试，
//!    次数用尽后把失败交还调用者；`NotFound` / `Malformed` 永不重试

use crate::error::FetchError;
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// 单实例限速器
///
/// 只有一个"上次调用时间戳"，由锁保护。锁在等待期间一直持有，
/// 因此并发调用者会排队，调用起点之间的间隔恒 ≥ 最小延迟。
pub struct RateLimiter {
    min_delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_call: Mutex::new(None),
        }
    }

    /// 等到允许发起下一次调用为止
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let next_allowed = prev + self.min_delay;
            if Instant::now() < next_allowed {
                tokio::time::sleep_until(next_allowed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// 限速重试客户端
pub struct RateLimitedClient {
    http: reqwest::Client,
    limiter: RateLimiter,
    max_retries: u32,
    retry_delay: Duration,
}

impl RateLimitedClient {
    /// 创建新的客户端
    ///
    /// # 参数
    /// - `http`: 预配置的 reqwest 客户端（默认请求头等由调用方决定）
    /// - `min_delay`: 两次调用之间的最小间隔
    /// - `max_retries`: 单次请求的最大尝试次数
    /// - `retry_delay`: 重试之间的固定等待
    pub fn new(
        http: reqwest::Client,
        min_delay: Duration,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            http,
            limiter: RateLimiter::new(min_delay),
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    /// 在限速与重试策略下执行一次操作
    ///
    /// `op` 每次尝试都会重新调用；返回可重试错误时等待固定间隔后
    /// 再试，次数用尽后把最后一次错误交还调用者。
    pub async fn execute<T, F, Fut>(&self, endpoint: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1;
        loop {
            self.limiter.wait().await;

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    warn!(
                        "尝试 {}/{} 失败 ({}): {}",
                        attempt, self.max_retries, endpoint, e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!("重试 {} 次后仍然失败 ({})", self.max_retries, endpoint);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// GET 请求并返回响应文本
    pub async fn get_text(
        &self,
        endpoint: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<String, FetchError> {
        let query: Vec<(String, String)> =
            query.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        self.execute(endpoint, || {
            let http = self.http.clone();
            let url = url.to_string();
            let query = query.clone();
            let endpoint = endpoint.to_string();
            async move {
                let resp = http
                    .get(&url)
                    .query(&query)
                    .send()
                    .await
                    .map_err(|e| classify_request_error(&endpoint, e))?;
                let resp = check_status(&endpoint, resp)?;
                resp.text()
                    .await
                    .map_err(|e| FetchError::transient(&endpoint, e))
            }
        })
        .await
    }

    /// GET 请求并解析 JSON 响应
    pub async fn get_json(
        &self,
        endpoint: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let text = self.get_text(endpoint, url, query).await?;
        serde_json::from_str(&text)
            .map_err(|e| FetchError::malformed(endpoint, format!("JSON 解析失败: {}", e)))
    }

    /// GET 请求并返回原始字节（用于源码包下载）
    pub async fn get_bytes(&self, endpoint: &str, url: &str) -> Result<Vec<u8>, FetchError> {
        self.execute(endpoint, || {
            let http = self.http.clone();
            let url = url.to_string();
            let endpoint = endpoint.to_string();
            async move {
                let resp = http
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| classify_request_error(&endpoint, e))?;
                let resp = check_status(&endpoint, resp)?;
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| FetchError::transient(&endpoint, e))?;
                Ok(bytes.to_vec())
            }
        })
        .await
    }
}

/// 按状态码归类响应
fn check_status(endpoint: &str, resp: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::NOT_FOUND => Err(FetchError::not_found(endpoint)),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            Err(FetchError::RateLimited {
                endpoint: endpoint.to_string(),
                retry_after,
            })
        }
        s if s.is_server_error() => Err(FetchError::transient(
            endpoint,
            std::io::Error::new(std::io::ErrorKind::Other, format!("服务端错误: HTTP {}", s)),
        )),
        s => Err(FetchError::malformed(
            endpoint,
            format!("请求被拒绝: HTTP {}", s),
        )),
    }
}

/// 归类 reqwest 传输层错误
fn classify_request_error(endpoint: &str, err: reqwest::Error) -> FetchError {
    if err.is_decode() {
        FetchError::malformed(endpoint, format!("响应解码失败: {}", err))
    } else {
        // 超时、连接失败等都按暂时性错误处理
        FetchError::transient(endpoint, err)
    }
}
