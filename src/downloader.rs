//! # 下载器门面
//!
//! ## 设计思路
//!
//! `Downloader` 是显式的上下文对象：拥有注册表与缓存，生命周期由创建者管理，
//! 测试可以创建互不干扰的独立实例。`Downloader::shared()` 只是惰性创建的进程级默认实例，
//! 不是唯一入口。
//!
//! ## 实现思路
//!
//! - `DownloaderBuilder` 收集全局默认值（占位图、请求头、缩放、滤镜、缓存容量与策略、超时）
//!   以及可注入的协作者（传输、编解码、执行器、本地资源、tokio 运行时）。
//! - 每次 `load_*` 复制一份默认值生成新请求，请求级覆盖只影响该请求；
//!   默认值在构建后不可变。
//! - 缩放变换排在自定义滤镜之前。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tokio::runtime::{Handle, Runtime};

use crate::cache::BoundedCache;
use crate::config::{CacheMode, DownloaderConfig, ImagePerformanceProfile};
use crate::error::ImageError;
use crate::executor::{DeliveryExecutor, SerialExecutor};
use crate::fetch::{HttpTransport, ReqwestTransport};
use crate::imaging::{
    AssetDirectory, Bitmap, ImageCodec, LocalAssetLoader, RasterCodec, ScaleTarget, ScaleTransform,
    Transform, TransformPipeline,
};
use crate::request::{LoaderContext, Registry, Request, RequestSettings, SourceRef};
use crate::target::TargetId;

const DELIVERY_THREAD_NAME: &str = "image-delivery";

static SHARED: OnceCell<Downloader> = OnceCell::new();
static BACKGROUND_RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// 图片下载器。克隆共享同一份注册表与缓存。
#[derive(Clone)]
pub struct Downloader {
    inner: Arc<DownloaderInner>,
}

struct DownloaderInner {
    config: DownloaderConfig,
    defaults: RequestSettings,
    ctx: Arc<LoaderContext>,
}

impl Downloader {
    pub fn builder() -> DownloaderBuilder {
        DownloaderBuilder::default()
    }

    /// 进程级默认实例，首次调用时按默认配置创建。
    pub fn shared() -> Result<&'static Downloader, ImageError> {
        SHARED.get_or_try_init(|| Downloader::builder().build())
    }

    /// 加载远程图片。
    pub fn load_url(&self, url: impl Into<String>) -> Request {
        self.load(SourceRef::url(url))
    }

    /// 加载本地资源。
    pub fn load_named(&self, name: impl Into<String>) -> Request {
        self.load(SourceRef::named(name))
    }

    /// 以任意来源（或无来源）创建请求，预置全局默认值。
    pub fn load(&self, source: impl Into<Option<SourceRef>>) -> Request {
        Request::new(
            source.into(),
            self.inner.defaults.clone(),
            Arc::clone(&self.inner.ctx),
        )
    }

    /// 取消目标上正在进行的请求。
    pub fn cancel_request(&self, target: TargetId) {
        self.inner.ctx.registry.cancel_operation(target);
    }

    /// 运行时调整缓存容量；缩小会立即淘汰。
    pub fn set_cache_limit(&self, limit: usize) {
        self.inner.ctx.cache.set_capacity(limit);
    }

    pub fn cache(&self) -> &BoundedCache {
        &self.inner.ctx.cache
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.ctx.registry
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.inner.config
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.inner.ctx.cache_mode
    }
}

/// 下载器构建器。
#[derive(Default)]
pub struct DownloaderBuilder {
    config: DownloaderConfig,
    placeholder: Option<Bitmap>,
    headers: BTreeMap<String, String>,
    resize: Option<ScaleTarget>,
    filters: Vec<Arc<dyn Transform>>,
    transport: Option<Arc<dyn HttpTransport>>,
    codec: Option<Arc<dyn ImageCodec>>,
    executor: Option<Arc<dyn DeliveryExecutor>>,
    local_assets: Option<Arc<dyn LocalAssetLoader>>,
    runtime: Option<Handle>,
}

impl DownloaderBuilder {
    /// 以完整配置为基础，后续选项在其上覆盖。
    pub fn config(mut self, config: DownloaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn placeholder(mut self, bitmap: Bitmap) -> Self {
        self.placeholder = Some(bitmap);
        self
    }

    /// 追加默认请求头。
    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// 默认缩放到指定尺寸；宽或高为 0 时按比例计算另一边。
    pub fn resize(self, width: u32, height: u32) -> Self {
        self.scale(ScaleTarget::size(width, height))
    }

    /// 默认缩放（比例、最长边等）。
    pub fn scale(mut self, target: ScaleTarget) -> Self {
        self.resize = Some(target);
        self
    }

    /// 追加默认滤镜，按添加顺序执行。
    pub fn filter(mut self, transform: Arc<dyn Transform>) -> Self {
        self.filters.push(transform);
        self
    }

    /// 性能档位：同时调整缩放滤镜与解码上限。
    pub fn performance_profile(mut self, profile: ImagePerformanceProfile) -> Self {
        self.config.apply_performance_profile(profile);
        self
    }

    pub fn cache_limit(mut self, limit: usize) -> Self {
        self.config.cache_limit = limit;
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.config.cache_mode = mode;
        self
    }

    /// HTTP 整体超时，精度为秒，最少 1 秒。
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.download_timeout = timeout.as_secs().max(1);
        self.config.connect_timeout = self.config.connect_timeout.min(self.config.download_timeout);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn DeliveryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn local_assets(mut self, loader: Arc<dyn LocalAssetLoader>) -> Self {
        self.local_assets = Some(loader);
        self
    }

    /// 网络任务运行的 tokio 运行时。
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Downloader, ImageError> {
        let config = self.config;
        config.validate()?;

        let codec: Arc<dyn ImageCodec> = match self.codec {
            Some(codec) => codec,
            None => Arc::new(RasterCodec::new(&config)),
        };
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config)?),
        };
        let executor: Arc<dyn DeliveryExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(SerialExecutor::spawn(DELIVERY_THREAD_NAME).map_err(|e| {
                ImageError::InvalidConfig(format!("无法启动投递线程：{}", e))
            })?),
        };
        let local_assets: Arc<dyn LocalAssetLoader> = match self.local_assets {
            Some(loader) => loader,
            None => Arc::new(AssetDirectory::new(
                config.asset_dirs.clone(),
                Arc::clone(&codec),
                config.max_file_size,
            )),
        };
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => match Handle::try_current() {
                Ok(runtime) => runtime,
                Err(_) => background_runtime()?,
            },
        };

        let mut pipeline = TransformPipeline::new();
        if let Some(target) = self.resize {
            pipeline.push(Arc::new(ScaleTransform::new(target, Arc::clone(&codec))));
        }
        for filter in self.filters {
            pipeline.push(filter);
        }

        let mut headers = config.default_headers.clone();
        headers.extend(self.headers);

        log::info!(
            "🚀 下载器已创建 - 缓存 {} 张（{:?}），超时 {} 秒，档位 {}，默认变换 {:?}",
            config.cache_limit,
            config.cache_mode,
            config.download_timeout,
            config.performance_profile.as_str(),
            pipeline
        );

        let ctx = LoaderContext {
            cache: BoundedCache::new(config.cache_limit),
            registry: Arc::new(Registry::new()),
            executor,
            transport,
            codec,
            local_assets,
            runtime,
            cache_mode: config.cache_mode,
        };

        Ok(Downloader {
            inner: Arc::new(DownloaderInner {
                defaults: RequestSettings {
                    placeholder: self.placeholder,
                    headers,
                    pipeline,
                },
                config,
                ctx: Arc::new(ctx),
            }),
        })
    }
}

/// 构建时不在 tokio 运行时内，则使用惰性创建的后台运行时。
fn background_runtime() -> Result<Handle, ImageError> {
    BACKGROUND_RUNTIME
        .get_or_try_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .thread_name("image-courier-io")
                .enable_all()
                .build()
        })
        .map(|runtime| runtime.handle().clone())
        .map_err(|e| ImageError::InvalidConfig(format!("无法创建后台运行时：{}", e)))
}
