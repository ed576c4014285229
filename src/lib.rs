//! # image-courier：异步图片获取管线
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Downloader（门面 + 全局默认值）                          │
//! │     │ load_url / load_named                              │
//! │     ▼                                                    │
//! │  Request ── 状态机 Ready → Executing → Finished/Cancelled │
//! │     │  ├─ Registry   每个目标至多一个请求（新请求取消旧请求）│
//! │     │  ├─ BoundedCache  URL → Bitmap（LRU）               │
//! │     │  └─ TransformPipeline  有序变换链                   │
//! │     ▼                                                    │
//! │  Fetcher ── HttpTransport (reqwest) ── ImageCodec (image) │
//! │     │        tokio 后台任务                               │
//! │     ▼                                                    │
//! │  DeliveryExecutor ── 回调 + ImageTarget::assign（主上下文）│
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `ImageError` |
//! | [`config`] | `DownloaderConfig`、缓存策略、性能档位 |
//! | [`imaging`] | 图片句柄、解码/缩放、变换链、本地资源 |
//! | [`cache`] | 容量受限的内存缓存 |
//! | [`fetch`] | HTTP 传输与单次可取消获取 |
//! | [`executor`] | 投递执行器（同步 / 主循环 / 串行线程） |
//! | [`target`] | 投递目标与目标标识 |
//! | [`request`] | 请求状态机与目标注册表 |
//! | [`downloader`] | 构建器与门面 |

pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod imaging;
pub mod request;
pub mod target;

#[cfg(test)]
mod test_support;

pub use cache::BoundedCache;
pub use config::{CacheMode, DownloaderConfig, ImagePerformanceProfile};
pub use downloader::{Downloader, DownloaderBuilder};
pub use error::ImageError;
pub use executor::{DeliveryExecutor, InlineExecutor, MainLoop, MainQueue, SerialExecutor};
pub use imaging::{Bitmap, ScaleTarget, Transform, TransformPipeline};
pub use request::{ImageResult, Registry, Request, RequestHandle, RequestState, SourceRef};
pub use target::{ImageTarget, TargetId};
