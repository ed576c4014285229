//! # 单次获取
//!
//! ## 设计思路
//!
//! `Fetcher` 包装一次出站请求：发请求、校验状态码、解码，最终**恰好一次**回调结果；
//! 一旦被取消则不再回调。
//!
//! ## 实现思路
//!
//! - 取消标记使用 `Arc<AtomicBool>`，在请求返回后、解码前后各检查一次。
//! - 网络阶段运行在 tokio 任务中，解码与回调放到 `spawn_blocking`，不占用异步工作线程。
//! - 取消时额外 `abort` 后台任务，尽早释放连接；正确性只依赖取消标记。
//! - 同一个 `Fetcher` 只能启动一次。
//! - 解码 panic 转为 `Decode` 错误照常回调，请求总能到达终态。

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::transport::{HttpRequest, HttpTransport, redact_url_for_log};
use crate::error::ImageError;
use crate::imaging::{Bitmap, ImageCodec};

/// 一次获取的结果回调。
pub type FetchCallback = Box<dyn FnOnce(Result<Bitmap, ImageError>) + Send + 'static>;

pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    codec: Arc<dyn ImageCodec>,
    runtime: Handle,
    cancelled: Arc<AtomicBool>,
    started: AtomicBool,
    task: Mutex<Option<AbortHandle>>,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, codec: Arc<dyn ImageCodec>, runtime: Handle) -> Self {
        Self {
            transport,
            codec,
            runtime,
            cancelled: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// 启动获取。已启动过或已取消时返回 `false`，回调不会被调用。
    pub fn fetch<F>(&self, url: &str, headers: BTreeMap<String, String>, callback: F) -> bool
    where
        F: FnOnce(Result<Bitmap, ImageError>) + Send + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            log::warn!("⚠️ Fetcher 不可重复启动：{}", redact_url_for_log(url));
            return false;
        }
        if self.is_cancelled() {
            return false;
        }

        let transport = Arc::clone(&self.transport);
        let codec = Arc::clone(&self.codec);
        let cancelled = Arc::clone(&self.cancelled);
        let request = HttpRequest::get(url, headers);
        let callback: FetchCallback = Box::new(callback);

        let join = self.runtime.spawn(async move {
            let log_url = redact_url_for_log(&request.url);
            let fetch_start = Instant::now();
            let outcome = transport.execute(request).await;

            if cancelled.load(Ordering::SeqCst) {
                log::debug!("🚫 获取已取消，丢弃响应：{}", log_url);
                return;
            }

            let response = match outcome {
                Ok(response) if response.is_success() => response,
                Ok(response) => {
                    log::warn!("⚠️ HTTP {} - {}", response.status, log_url);
                    callback(Err(ImageError::http_status(response.status)));
                    return;
                }
                Err(err) => {
                    log::warn!("⚠️ 获取失败 [{}] {}：{}", err.code(), log_url, err);
                    callback(Err(err));
                    return;
                }
            };
            let fetch_ms = fetch_start.elapsed().as_millis();

            let decode = tokio::task::spawn_blocking(move || {
                let decode_start = Instant::now();
                let result = catch_unwind(AssertUnwindSafe(|| codec.decode(&response.body)))
                    .unwrap_or_else(|_| {
                        log::error!("❌ 解码过程 panic：{}", log_url);
                        Err(ImageError::Decode("解码过程异常终止（panic）".to_string()))
                    });
                let decode_ms = decode_start.elapsed().as_millis();

                if cancelled.load(Ordering::SeqCst) {
                    log::debug!("🚫 获取已取消，丢弃解码结果：{}", log_url);
                    return;
                }

                match &result {
                    Ok(bitmap) => log::info!(
                        "✅ 获取完成 - {} {}x{}，阶段耗时 fetch={}ms decode={}ms",
                        log_url,
                        bitmap.width(),
                        bitmap.height(),
                        fetch_ms,
                        decode_ms
                    ),
                    Err(err) => log::warn!("⚠️ 解码失败 [{}] {}：{}", err.code(), log_url, err),
                }
                if catch_unwind(AssertUnwindSafe(move || callback(result))).is_err() {
                    log::error!("❌ 获取回调 panic：{}", log_url);
                }
            });

            if let Err(err) = decode.await {
                log::error!("❌ 解码任务异常退出：{}", err);
            }
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(join.abort_handle());
        }
        true
    }

    /// 取消获取，幂等。
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().ok().and_then(|mut t| t.take()) {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
