//! # 解码与缩放模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像”与“图像 → 缩放图像”集中管理，并在关键节点增加资源上限控制。
//! 优先做签名与尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. `infer` 识别文件签名，非图片直接拒绝
//! 2. 读取 header 尺寸，按像素/内存上限快速拒绝
//! 3. 完整解码
//! 4. 缩放优先走 `fast_image_resize`，失败回退 `image::resize_exact`

use std::io::Cursor;

use fast_image_resize as fr;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageReader, Rgba};

use super::Bitmap;
use crate::config::DownloaderConfig;
use crate::error::ImageError;

/// 缩放目标。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleTarget {
    /// 目标尺寸；宽或高为 0 时按另一边等比计算，两者皆 0 表示不缩放。
    Size {
        width: u32,
        height: u32,
        scale_up: bool,
    },
    /// 按比例缩放（`0.5` 即 50%）。
    Percentage(f64),
    /// 将最长边缩放到指定长度。
    LongestSide { side: u32, scale_up: bool },
}

impl ScaleTarget {
    /// 允许放大的目标尺寸。
    pub fn size(width: u32, height: u32) -> Self {
        Self::Size {
            width,
            height,
            scale_up: true,
        }
    }
}

/// 图片编解码能力。
pub trait ImageCodec: Send + Sync {
    /// 将原始字节解码为图片句柄。
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap, ImageError>;

    /// 缩放图片；返回 `None` 表示无需变化。
    fn scale(&self, bitmap: &Bitmap, target: ScaleTarget) -> Option<Bitmap>;
}

/// 计算缩放后的输出尺寸。
///
/// 返回 `None` 表示保持原图。
pub fn resolve_dimensions(width: u32, height: u32, target: ScaleTarget) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }

    let (out_width, out_height) = match target {
        ScaleTarget::Size {
            width: w,
            height: h,
            scale_up,
        } => {
            if w == 0 && h == 0 {
                return None;
            }
            if !scale_up && (w > width || h > height) {
                return None;
            }
            if w == 0 {
                let ratio = h as f64 / height as f64;
                ((width as f64 * ratio).round(), h as f64)
            } else if h == 0 {
                let ratio = w as f64 / width as f64;
                (w as f64, (height as f64 * ratio).round())
            } else {
                (w as f64, h as f64)
            }
        }
        ScaleTarget::Percentage(percentage) => {
            if !percentage.is_finite() || percentage <= 0.0 {
                return None;
            }
            (
                (width as f64 * percentage).round(),
                (height as f64 * percentage).round(),
            )
        }
        ScaleTarget::LongestSide { side, scale_up } => {
            if side == 0 {
                return None;
            }
            let factor = side as f64 / width.max(height) as f64;
            if !scale_up && factor > 1.0 {
                return None;
            }
            return resolve_dimensions(width, height, ScaleTarget::Percentage(factor));
        }
    };

    let out = (
        out_width.clamp(1.0, u32::MAX as f64) as u32,
        out_height.clamp(1.0, u32::MAX as f64) as u32,
    );

    if out == (width, height) {
        None
    } else {
        Some(out)
    }
}

/// 基于 `image` + `fast_image_resize` 的默认编解码器。
#[derive(Debug, Clone)]
pub struct RasterCodec {
    max_decoded_pixels: u64,
    max_decoded_bytes: u64,
    filter: FilterType,
}

impl RasterCodec {
    pub fn new(config: &DownloaderConfig) -> Self {
        Self {
            max_decoded_pixels: config.max_decoded_pixels,
            max_decoded_bytes: config.max_decoded_bytes,
            filter: config.resize_filter(),
        }
    }

    /// 仅通过内存中的图片头信息读取宽高。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| ImageError::Decode(format!("无法读取图片尺寸：{}", e)))
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Decode("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| ImageError::Decode("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(ImageError::Decode(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }

    fn validate_limits(&self, width: u32, height: u32) -> Result<(), ImageError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > self.max_decoded_pixels {
            return Err(ImageError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, self.max_decoded_pixels
            )));
        }

        let estimated = pixels
            .checked_mul(4)
            .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > self.max_decoded_bytes {
            return Err(ImageError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                self.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        match Self::resize_with_fast_image_resize(image, width, height, self.filter) {
            Ok(resized) => resized,
            Err(err) => {
                log::warn!(
                    "⚠️ fast_image_resize 缩放失败，回退 image::resize_exact：{}",
                    err
                );
                image.resize_exact(width, height, self.filter)
            }
        }
    }

    fn resize_with_fast_image_resize(
        image: &DynamicImage,
        target_width: u32,
        target_height: u32,
        filter: FilterType,
    ) -> Result<DynamicImage, ImageError> {
        let src = image.to_rgba8();
        let (src_width, src_height) = src.dimensions();

        let src_image = fr::images::Image::from_vec_u8(
            src_width,
            src_height,
            src.into_raw(),
            fr::PixelType::U8x4,
        )
        .map_err(|e| ImageError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

        let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(Self::to_fast_filter(filter)));

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| ImageError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

        let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
            target_width,
            target_height,
            dst_image.into_vec(),
        )
        .ok_or_else(|| ImageError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))?;

        Ok(DynamicImage::ImageRgba8(rgba))
    }

    fn to_fast_filter(filter: FilterType) -> fr::FilterType {
        match filter {
            FilterType::Nearest => fr::FilterType::Box,
            FilterType::Triangle => fr::FilterType::Bilinear,
            FilterType::CatmullRom => fr::FilterType::CatmullRom,
            FilterType::Gaussian => fr::FilterType::Mitchell,
            FilterType::Lanczos3 => fr::FilterType::Lanczos3,
        }
    }
}

impl Default for RasterCodec {
    fn default() -> Self {
        Self::new(&DownloaderConfig::default())
    }
}

impl ImageCodec for RasterCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap, ImageError> {
        Self::validate_image_signature(bytes)?;

        let (header_width, header_height) = Self::inspect_dimensions_from_memory(bytes)?;
        self.validate_limits(header_width, header_height)?;

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

        let (width, height) = decoded.dimensions();
        self.validate_limits(width, height)?;

        Ok(Bitmap::new(decoded))
    }

    fn scale(&self, bitmap: &Bitmap, target: ScaleTarget) -> Option<Bitmap> {
        let (width, height) = bitmap.dimensions();
        let (out_width, out_height) = resolve_dimensions(width, height, target)?;

        log::debug!(
            "🧩 缩放：{}x{} -> {}x{}（filter={:?}）",
            width,
            height,
            out_width,
            out_height,
            self.filter
        );

        Some(Bitmap::new(self.resize(bitmap.as_image(), out_width, out_height)))
    }
}
