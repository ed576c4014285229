//! # 变换链模块
//!
//! ## 设计思路
//!
//! 变换是纯函数 `Bitmap -> Option<Bitmap>`，`None` 表示“无变化”。
//! 变换链按调用方指定顺序从左到右执行，单个变换无变化时保留当前结果继续执行，
//! 永远不会中断整条链。

use std::fmt;
use std::sync::Arc;

use super::{Bitmap, ImageCodec, ScaleTarget};

/// 单个图片变换。
pub trait Transform: Send + Sync {
    /// 返回 `None` 表示保持输入不变。
    fn apply(&self, bitmap: &Bitmap) -> Option<Bitmap>;

    /// 日志中展示的名称。
    fn name(&self) -> &str {
        "transform"
    }
}

impl<F> Transform for F
where
    F: Fn(&Bitmap) -> Option<Bitmap> + Send + Sync,
{
    fn apply(&self, bitmap: &Bitmap) -> Option<Bitmap> {
        self(bitmap)
    }
}

/// 缩放变换，委托给编解码器执行。
pub struct ScaleTransform {
    target: ScaleTarget,
    codec: Arc<dyn ImageCodec>,
}

impl ScaleTransform {
    pub fn new(target: ScaleTarget, codec: Arc<dyn ImageCodec>) -> Self {
        Self { target, codec }
    }

    pub fn target(&self) -> ScaleTarget {
        self.target
    }
}

impl Transform for ScaleTransform {
    fn apply(&self, bitmap: &Bitmap) -> Option<Bitmap> {
        self.codec.scale(bitmap, self.target)
    }

    fn name(&self) -> &str {
        "scale"
    }
}

/// 有序变换链。克隆只复制变换引用。
#[derive(Clone, Default)]
pub struct TransformPipeline {
    transforms: Vec<Arc<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Arc<dyn Transform>) {
        self.transforms.push(transform);
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// 依次执行所有变换。
    pub fn apply(&self, bitmap: Bitmap) -> Bitmap {
        self.transforms
            .iter()
            .fold(bitmap, |current, transform| match transform.apply(&current) {
                Some(next) => next,
                None => {
                    log::debug!("变换 {} 无变化，保留当前图片", transform.name());
                    current
                }
            })
    }
}

impl fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.transforms.iter().map(|t| t.name()))
            .finish()
    }
}
