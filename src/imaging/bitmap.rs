//! 解码后的图片句柄。
//!
//! 核心链路只移动、变换、缓存句柄，不关心像素内部结构。
//! 克隆只增加引用计数，相等性按句柄身份判断。

use std::fmt;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView};

/// 不透明图片句柄。
#[derive(Clone)]
pub struct Bitmap {
    image: Arc<DynamicImage>,
}

impl Bitmap {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// 访问底层解码图像（供编解码器与自定义变换使用）。
    pub fn as_image(&self) -> &DynamicImage {
        &self.image
    }

    /// 两个句柄是否指向同一份解码数据。
    pub fn same_handle(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.same_handle(other)
    }
}

impl Eq for Bitmap {}

impl From<DynamicImage> for Bitmap {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_handle() {
        let bitmap = Bitmap::new(DynamicImage::new_rgba8(4, 3));
        let clone = bitmap.clone();

        assert_eq!(bitmap, clone);
        assert_eq!(clone.dimensions(), (4, 3));
    }

    #[test]
    fn equal_pixels_are_distinct_handles() {
        let a = Bitmap::new(DynamicImage::new_rgba8(2, 2));
        let b = Bitmap::new(DynamicImage::new_rgba8(2, 2));

        assert_ne!(a, b);
    }
}
