//! # 请求模块
//!
//! ## 设计思路
//!
//! `Request` 是一次图片获取的工作单元，驱动“缓存检查 → 获取 → 变换 → 写缓存 → 投递”。
//! 核心难点是“图片已到达”与“调用方已取消/替换”之间的竞争：
//!
//! - 状态为原子值，所有转换都是 CAS（见 `state`）。
//! - Executing → Finished 的转换放在投递任务内部，在投递执行器上完成；
//!   因此只要取消先于投递任务执行，取消必然胜出，回调不会触发。
//! - 带目标的请求先在注册表登记，再进入 Executing；
//!   登记时若已被新请求取代，`begin` 失败，静默结束。
//!
//! ## 实现思路
//!
//! 1. 已取消：从注册表清理后直接返回，不回调。
//! 2. 远程 URL 命中缓存：`Originals` 模式重新执行变换链，`Processed` 模式直接投递。
//! 3. 远程 URL 未命中：交给 `Fetcher`，结果到达后变换、按缓存策略写缓存、投递。
//! 4. 本地资源：同步加载，不读写缓存，变换后投递。
//! 5. 无来源：投递 `Ok(None)`。
//!
//! 变换链中的 panic 被捕获并作为 `Decode` 错误投递，请求照常进入终态并释放目标。

mod registry;
mod source;
mod state;

pub use registry::Registry;
pub use source::SourceRef;
pub use state::{AtomicRequestState, RequestState};

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use tokio::runtime::Handle;

use crate::cache::BoundedCache;
use crate::config::CacheMode;
use crate::error::ImageError;
use crate::executor::DeliveryExecutor;
use crate::fetch::{Fetcher, HttpTransport};
use crate::imaging::{
    Bitmap, ImageCodec, LocalAssetLoader, ScaleTarget, ScaleTransform, Transform, TransformPipeline,
};
use crate::target::{ImageTarget, TargetId};

/// 投递结果。`Ok(None)` 表示“没有可展示的内容”，不是失败。
pub type ImageResult = Result<Option<Bitmap>, ImageError>;

type Delivery = Box<dyn FnOnce(ImageResult) + Send + 'static>;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// 请求级配置：占位图、请求头、变换链。
#[derive(Clone, Default)]
pub(crate) struct RequestSettings {
    pub placeholder: Option<Bitmap>,
    pub headers: BTreeMap<String, String>,
    pub pipeline: TransformPipeline,
}

/// 同一个下载器创建的所有请求共享的协作者。
pub(crate) struct LoaderContext {
    pub cache: BoundedCache,
    pub registry: Arc<Registry>,
    pub executor: Arc<dyn DeliveryExecutor>,
    pub transport: Arc<dyn HttpTransport>,
    pub codec: Arc<dyn ImageCodec>,
    pub local_assets: Arc<dyn LocalAssetLoader>,
    pub runtime: Handle,
    pub cache_mode: CacheMode,
}

struct RequestInner {
    id: u64,
    source: Option<SourceRef>,
    settings: Mutex<RequestSettings>,
    state: AtomicRequestState,
    target: OnceLock<TargetId>,
    fetcher: Fetcher,
    ctx: Arc<LoaderContext>,
}

/// 一次图片请求。配置方法只在请求开始前生效。
pub struct Request {
    inner: Arc<RequestInner>,
}

/// 请求句柄，用于查询状态与取消。
#[derive(Clone)]
pub struct RequestHandle {
    inner: Arc<RequestInner>,
}

impl Request {
    pub(crate) fn new(
        source: Option<SourceRef>,
        settings: RequestSettings,
        ctx: Arc<LoaderContext>,
    ) -> Self {
        let fetcher = Fetcher::new(
            Arc::clone(&ctx.transport),
            Arc::clone(&ctx.codec),
            ctx.runtime.clone(),
        );

        Self {
            inner: Arc::new(RequestInner {
                id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
                source,
                settings: Mutex::new(settings),
                state: AtomicRequestState::new(),
                target: OnceLock::new(),
                fetcher,
                ctx,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn source(&self) -> Option<&SourceRef> {
        self.inner.source.as_ref()
    }

    pub fn state(&self) -> RequestState {
        self.inner.state.get()
    }

    pub fn handle(&self) -> RequestHandle {
        RequestHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancel();
    }

    fn configure(self, apply: impl FnOnce(&mut RequestSettings)) -> Self {
        if !self.inner.state.is_ready() {
            log::debug!("请求 #{} 已不在 Ready 状态，忽略配置", self.inner.id);
            return self;
        }
        if let Ok(mut settings) = self.inner.settings.lock() {
            apply(&mut settings);
        }
        self
    }

    pub fn placeholder(self, bitmap: Bitmap) -> Self {
        self.configure(|s| s.placeholder = Some(bitmap))
    }

    /// 替换全部请求头。
    pub fn headers(self, headers: BTreeMap<String, String>) -> Self {
        self.configure(|s| s.headers = headers)
    }

    pub fn add_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        self.configure(|s| {
            s.headers.insert(name, value);
        })
    }

    /// 替换整条变换链。
    pub fn transforms(self, pipeline: TransformPipeline) -> Self {
        self.configure(|s| s.pipeline = pipeline)
    }

    /// 在变换链末尾追加一个变换。
    pub fn add_filter(self, transform: Arc<dyn Transform>) -> Self {
        self.configure(|s| s.pipeline.push(transform))
    }

    /// 在变换链末尾追加一个缩放变换。
    pub fn scale(self, target: ScaleTarget) -> Self {
        let codec = Arc::clone(&self.inner.ctx.codec);
        self.add_filter(Arc::new(ScaleTransform::new(target, codec)))
    }

    /// 执行请求，结果在投递执行器上回调。
    pub fn execute<F>(self, callback: F) -> RequestHandle
    where
        F: FnOnce(ImageResult) + Send + 'static,
    {
        let handle = self.handle();
        RequestInner::start(self.inner, Box::new(callback));
        handle
    }

    /// 执行请求并把结果赋给目标。
    ///
    /// 目标上已有的请求先被取消；占位图（如有）立即经执行器赋给目标；
    /// 只有成功拿到图片时才赋值，回调无论成败都会执行。
    pub fn into<F>(self, target: Arc<dyn ImageTarget>, callback: F) -> RequestHandle
    where
        F: FnOnce(ImageResult) + Send + 'static,
    {
        let inner = self.inner;
        let target_id = target.id();

        inner.ctx.registry.cancel_operation(target_id);
        let _ = inner.target.set(target_id);

        let placeholder = inner
            .settings
            .lock()
            .ok()
            .and_then(|settings| settings.placeholder.clone());
        if let Some(placeholder) = placeholder {
            let guard = Arc::clone(&inner);
            let target = Arc::clone(&target);
            inner.ctx.executor.dispatch(Box::new(move || {
                if !guard.state.is_cancelled() {
                    target.assign(placeholder);
                }
            }));
        }

        let handle = RequestHandle {
            inner: Arc::clone(&inner),
        };
        RequestInner::start(
            inner,
            Box::new(move |result: ImageResult| {
                if let Ok(Some(bitmap)) = &result {
                    target.assign(bitmap.clone());
                }
                callback(result);
            }),
        );
        handle
    }

    /// 不关心结果时的 `into`。
    pub fn into_target(self, target: Arc<dyn ImageTarget>) -> RequestHandle {
        self.into(target, |_| {})
    }
}

impl RequestHandle {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> RequestState {
        self.inner.state.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.is_cancelled()
    }

    pub fn source(&self) -> Option<&SourceRef> {
        self.inner.source.as_ref()
    }

    /// 取消请求，幂等；已完成的请求不受影响。
    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

impl RequestInner {
    fn cancel(&self) {
        if self.state.cancel() {
            log::debug!("🚫 请求 #{} 已取消", self.id);
        }
        self.fetcher.cancel();
        self.release_target();
    }

    fn release_target(&self) {
        if let Some(target) = self.target.get() {
            self.ctx.registry.finish_request(*target, self.id);
        }
    }

    fn settings_snapshot(&self) -> RequestSettings {
        self.settings
            .lock()
            .map(|settings| settings.clone())
            .unwrap_or_default()
    }

    fn start(self: Arc<Self>, delivery: Delivery) {
        if let Some(target) = self.target.get() {
            self.ctx.registry.register_operation(*target, RequestHandle {
                inner: Arc::clone(&self),
            });
        }

        if !self.state.begin() {
            log::debug!("请求 #{} 启动前已取消，静默结束", self.id);
            self.release_target();
            return;
        }

        let settings = self.settings_snapshot();

        match self.source.clone() {
            None => {
                log::debug!("请求 #{} 未配置来源", self.id);
                self.deliver(Ok(None), delivery);
            }
            Some(SourceRef::LocalName(name)) => {
                let loaded = self.ctx.local_assets.load_local(&name);
                let result = loaded
                    .map(|bitmap| self.transform(bitmap, &settings.pipeline))
                    .transpose();
                self.deliver(result, delivery);
            }
            Some(SourceRef::RemoteUrl(url)) => {
                if let Some(cached) = self.ctx.cache.get(&url) {
                    log::debug!("♻️ 命中缓存 #{} {}", self.id, crate::fetch::redact_url_for_log(&url));
                    let result = match self.ctx.cache_mode {
                        CacheMode::Originals => self.transform(cached, &settings.pipeline),
                        CacheMode::Processed => Ok(cached),
                    };
                    self.deliver(result.map(Some), delivery);
                    return;
                }

                let inner = Arc::clone(&self);
                let pipeline = settings.pipeline;
                let key = url.clone();
                let started = self.fetcher.fetch(&url, settings.headers, move |result| {
                    inner.complete_fetch(key, pipeline, result, delivery);
                });
                if !started {
                    log::warn!("⚠️ 请求 #{} 未能启动获取", self.id);
                    self.cancel();
                }
            }
        }
    }

    fn complete_fetch(
        self: Arc<Self>,
        url: String,
        pipeline: TransformPipeline,
        result: Result<Bitmap, ImageError>,
        delivery: Delivery,
    ) {
        if self.state.is_cancelled() {
            log::debug!("请求 #{} 已取消，丢弃获取结果", self.id);
            self.release_target();
            return;
        }

        let processed = result.and_then(|original| {
            let processed = self.transform(original.clone(), &pipeline)?;
            let cached = match self.ctx.cache_mode {
                CacheMode::Originals => original,
                CacheMode::Processed => processed.clone(),
            };
            self.ctx.cache.set(url, cached);
            Ok(processed)
        });
        self.deliver(processed.map(Some), delivery);
    }

    /// 执行变换链；链中 panic 时返回 `Decode` 错误，不写缓存。
    fn transform(&self, bitmap: Bitmap, pipeline: &TransformPipeline) -> Result<Bitmap, ImageError> {
        if pipeline.is_empty() {
            return Ok(bitmap);
        }

        let started = Instant::now();
        let output = catch_unwind(AssertUnwindSafe(|| pipeline.apply(bitmap))).map_err(|_| {
            log::error!("❌ 请求 #{} 变换 panic：{:?}", self.id, pipeline);
            ImageError::Decode(format!("变换 {:?} 异常终止（panic）", pipeline))
        })?;
        log::debug!(
            "🧩 请求 #{} 变换完成：{:?}，耗时 {}ms",
            self.id,
            pipeline,
            started.elapsed().as_millis()
        );
        Ok(output)
    }

    /// 切换到投递执行器；终态转换在投递任务内完成。
    fn deliver(self: Arc<Self>, result: ImageResult, delivery: Delivery) {
        let executor = Arc::clone(&self.ctx.executor);
        executor.dispatch(Box::new(move || {
            if self.state.finish() {
                delivery(result);
            } else {
                log::debug!("请求 #{} 已取消，投递被抑制", self.id);
            }
            self.release_target();
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheMode;
    use crate::test_support::{RecordingTarget, StubTransport, create_png_bytes, downloader_with};
    use image::DynamicImage;
    use std::time::Duration;

    fn result_slot() -> (Arc<Mutex<Vec<ImageResult>>>, impl FnOnce(ImageResult) + Send + 'static) {
        let slot = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&slot);
        (slot, move |result| sink.lock().expect("slot lock").push(result))
    }

    #[tokio::test]
    async fn missing_source_delivers_nothing_to_show() {
        let (downloader, _) = downloader_with(StubTransport::new(), CacheMode::Originals);
        let (slot, callback) = result_slot();

        downloader.load(None).execute(callback);

        let results = slot.lock().expect("slot lock");
        assert!(matches!(results.as_slice(), [Ok(None)]));
    }

    #[tokio::test]
    async fn missing_local_asset_is_not_an_error() {
        let (downloader, _) = downloader_with(StubTransport::new(), CacheMode::Originals);
        let (slot, callback) = result_slot();

        downloader.load_named("does-not-exist").execute(callback);

        assert!(matches!(slot.lock().expect("slot lock").as_slice(), [Ok(None)]));
    }

    #[tokio::test]
    async fn cancelled_request_never_calls_back() {
        let (downloader, transport) = downloader_with(StubTransport::new(), CacheMode::Originals);
        let (slot, callback) = result_slot();

        let request = downloader.load_url("http://x/a.png");
        request.cancel();
        let handle = request.execute(callback);

        assert_eq!(handle.state(), RequestState::Cancelled);
        assert!(slot.lock().expect("slot lock").is_empty());
        assert_eq!(transport.calls("http://x/a.png"), 0);
    }

    #[tokio::test]
    async fn configuration_after_cancel_is_ignored() {
        let (downloader, _) = downloader_with(StubTransport::new(), CacheMode::Originals);

        let request = downloader.load_url("http://x/a.png");
        request.cancel();
        let request = request.add_header("X-Late", "1");

        assert!(request.inner.settings_snapshot().headers.is_empty());
    }

    #[tokio::test]
    async fn per_request_overrides_do_not_leak() {
        let (downloader, transport) = downloader_with(StubTransport::new(), CacheMode::Originals);
        transport.respond("http://x/a.png", 200, create_png_bytes(2, 2));
        transport.respond("http://x/b.png", 200, create_png_bytes(2, 2));

        let first = downloader.load_url("http://x/a.png").add_header("X-Only", "first");
        let second = downloader.load_url("http://x/b.png");

        assert_eq!(
            first.inner.settings_snapshot().headers.get("X-Only").map(String::as_str),
            Some("first")
        );
        assert!(second.inner.settings_snapshot().headers.get("X-Only").is_none());
    }

    #[tokio::test]
    async fn placeholder_is_assigned_before_result() {
        let (downloader, transport) = downloader_with(StubTransport::new(), CacheMode::Originals);
        transport.respond("http://x/a.png", 404, Vec::new());
        let placeholder = Bitmap::new(DynamicImage::new_rgba8(1, 1));
        let target = Arc::new(RecordingTarget::new());
        let (tx, rx) = tokio::sync::oneshot::channel();

        downloader
            .load_url("http://x/a.png")
            .placeholder(placeholder.clone())
            .into(target.clone(), move |result| {
                let _ = tx.send(result);
            });

        let result = rx.await.expect("callback should fire");
        assert_eq!(result.expect_err("404").status(), Some(404));
        // 失败时占位图保留
        assert_eq!(target.assigned(), vec![placeholder]);
    }

    #[tokio::test]
    async fn panicking_filter_fails_request_and_frees_target() {
        let (downloader, transport) = downloader_with(StubTransport::new(), CacheMode::Processed);
        transport.respond("http://x/a.png", 200, create_png_bytes(4, 4));
        let target = Arc::new(RecordingTarget::new());
        let (tx, rx) = tokio::sync::oneshot::channel();

        let handle = downloader
            .load_url("http://x/a.png")
            .add_filter(Arc::new(|_: &Bitmap| -> Option<Bitmap> { panic!("filter failed") }))
            .into(target.clone(), move |result| {
                let _ = tx.send(result);
            });

        let result = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("callback should fire after a filter panic")
            .expect("callback should fire");
        assert!(matches!(result, Err(ImageError::Decode(_))));
        assert_eq!(handle.state(), RequestState::Finished);
        assert!(downloader.cache().is_empty());

        // 回调之后才释放目标
        for _ in 0..100 {
            if !downloader.registry().is_tracking(target.id()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!downloader.registry().is_tracking(target.id()));
        assert!(target.assigned().is_empty());
    }

    #[tokio::test]
    async fn panicking_filter_on_cache_hit_is_delivered_as_error() {
        let (downloader, transport) = downloader_with(StubTransport::new(), CacheMode::Originals);
        transport.respond("http://x/a.png", 200, create_png_bytes(4, 4));
        let (tx, rx) = tokio::sync::oneshot::channel();
        downloader.load_url("http://x/a.png").execute(move |result| {
            let _ = tx.send(result);
        });
        rx.await.expect("first delivery").expect("first load ok");

        let (slot, callback) = result_slot();
        downloader
            .load_url("http://x/a.png")
            .add_filter(Arc::new(|_: &Bitmap| -> Option<Bitmap> { panic!("filter failed") }))
            .execute(callback);

        assert!(matches!(slot.lock().expect("slot lock").as_slice(), [Err(ImageError::Decode(_))]));
        assert_eq!(transport.calls("http://x/a.png"), 1);
    }
}
