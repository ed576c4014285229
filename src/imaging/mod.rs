//! # 图片处理模块
//!
//! - `bitmap`：不透明图片句柄
//! - `codec`：解码、资源上限、缩放
//! - `transform`：变换与有序变换链
//! - `assets`：本地资源按名称加载

mod assets;
mod bitmap;
mod codec;
mod transform;

pub use assets::{AssetDirectory, LocalAssetLoader};
pub use bitmap::Bitmap;
pub use codec::{ImageCodec, RasterCodec, ScaleTarget, resolve_dimensions};
pub use transform::{ScaleTransform, Transform, TransformPipeline};
