//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `DownloaderConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中性能档位（quality / balanced / speed）作为高层语义，映射到底层缩放滤镜与解码上限。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置（超时 60 秒、缓存 50 张）。
//! - 支持从 JSON 读取，缺省字段回落到默认值。
//! - `validate` 在构建下载器前集中做范围校验，尽早失败。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::ImageError;

/// 默认缓存容量（张）。
pub const DEFAULT_CACHE_LIMIT: usize = 50;
/// 默认 HTTP 超时（秒）。
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// 缓存策略：缓存原图还是变换后的图。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// 缓存解码后的原图；命中时按当前请求的变换链重新处理。
    #[default]
    Originals,
    /// 缓存变换后的结果；命中时直接投递，不再变换。
    Processed,
}

/// 图片性能档位（面向调用方语义）。
///
/// - `Quality`：尽量保真
/// - `Balanced`：质量与性能平衡
/// - `Speed`：优先速度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePerformanceProfile {
    Quality,
    #[default]
    Balanced,
    Speed,
}

impl ImagePerformanceProfile {
    /// 从外部字符串解析档位。
    pub fn parse(profile: &str) -> Result<Self, ImageError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(ImageError::InvalidConfig(format!(
                "未知性能档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }

    /// 档位对应的缩放滤镜。
    pub fn resize_filter(self) -> FilterType {
        match self {
            Self::Quality => FilterType::CatmullRom,
            Self::Balanced => FilterType::Triangle,
            Self::Speed => FilterType::Nearest,
        }
    }
}

/// 下载器配置。
///
/// 字段覆盖了下载、解码、缓存三个阶段。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// 网络请求整体超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 下载/读取原始字节时允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 内存缓存容量（张）。
    pub cache_limit: usize,
    /// 缓存策略。
    pub cache_mode: CacheMode,
    /// 性能档位，决定缩放滤镜。
    pub performance_profile: ImagePerformanceProfile,
    /// 默认 User-Agent。
    pub user_agent: String,
    /// 每个请求默认携带的 HTTP 头。
    pub default_headers: BTreeMap<String, String>,
    /// 本地资源查找目录，按顺序尝试。
    pub asset_dirs: Vec<PathBuf>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            download_timeout: DEFAULT_TIMEOUT_SECS,
            connect_timeout: 10,
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            cache_limit: DEFAULT_CACHE_LIMIT,
            cache_mode: CacheMode::Originals,
            performance_profile: ImagePerformanceProfile::Balanced,
            user_agent: concat!("image-courier/", env!("CARGO_PKG_VERSION")).to_string(),
            default_headers: BTreeMap::new(),
            asset_dirs: Vec::new(),
        }
    }
}

impl DownloaderConfig {
    /// 从 JSON 文本解析配置，缺省字段使用默认值。
    pub fn from_json_str(text: &str) -> Result<Self, ImageError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ImageError::InvalidConfig(format!("解析配置失败：{}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件读取配置。
    pub fn load_from_path(path: &Path) -> Result<Self, ImageError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ImageError::InvalidConfig(format!("无法读取配置文件 {}：{}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// 范围校验。
    pub fn validate(&self) -> Result<(), ImageError> {
        if !(1..=600).contains(&self.download_timeout) {
            return Err(ImageError::InvalidConfig(
                "download_timeout 必须在 1~600 秒之间".to_string(),
            ));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(ImageError::InvalidConfig(
                "connect_timeout 必须在 1~120 秒之间".to_string(),
            ));
        }
        if self.connect_timeout > self.download_timeout {
            return Err(ImageError::InvalidConfig(
                "connect_timeout 不能大于 download_timeout".to_string(),
            ));
        }
        if self.max_file_size == 0 {
            return Err(ImageError::InvalidConfig("max_file_size 不能为 0".to_string()));
        }
        if self.max_decoded_pixels == 0 {
            return Err(ImageError::InvalidConfig("max_decoded_pixels 不能为 0".to_string()));
        }
        if self.max_decoded_bytes < 4 {
            return Err(ImageError::InvalidConfig("max_decoded_bytes 过小".to_string()));
        }
        Ok(())
    }

    pub fn apply_performance_profile(&mut self, profile: ImagePerformanceProfile) {
        self.performance_profile = profile;
        match profile {
            ImagePerformanceProfile::Quality => {
                self.max_decoded_pixels = 80_000_000;
                self.max_decoded_bytes = 320 * 1024 * 1024;
            }
            ImagePerformanceProfile::Balanced => {
                self.max_decoded_pixels = 40_000_000;
                self.max_decoded_bytes = 160 * 1024 * 1024;
            }
            ImagePerformanceProfile::Speed => {
                self.max_decoded_pixels = 16_000_000;
                self.max_decoded_bytes = 64 * 1024 * 1024;
            }
        }
    }

    pub fn resize_filter(&self) -> FilterType {
        self.performance_profile.resize_filter()
    }
}
