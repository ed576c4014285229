//! # 本地资源加载模块
//!
//! ## 设计思路
//!
//! 本地资源按名称同步加载，不走网络，也不进入缓存（本地重新读取代价低）。
//! 找不到资源不是错误，返回 `None`；读取或解码失败同样只记录日志并返回 `None`。
//!
//! ## 实现思路
//!
//! - 按配置顺序遍历资源目录。
//! - 名称本身带扩展名时直接命中；否则依次尝试常见图片扩展名。
//! - 读取前做体积校验，避免误读超大文件。

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::{Bitmap, ImageCodec};

const ASSET_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "webp", "bmp", "ico"];

/// 按名称加载本地图片。
pub trait LocalAssetLoader: Send + Sync {
    /// 找不到时返回 `None`，不视为错误。
    fn load_local(&self, name: &str) -> Option<Bitmap>;
}

/// 基于目录的本地资源加载器。
pub struct AssetDirectory {
    roots: Vec<PathBuf>,
    codec: Arc<dyn ImageCodec>,
    max_file_size: u64,
}

impl AssetDirectory {
    pub fn new(roots: Vec<PathBuf>, codec: Arc<dyn ImageCodec>, max_file_size: u64) -> Self {
        Self {
            roots,
            codec,
            max_file_size,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// 解析资源名称对应的文件路径。
    ///
    /// 拒绝绝对路径与 `..`，资源名只能落在资源目录内。
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name.trim());
        if relative.as_os_str().is_empty() {
            return None;
        }

        let escapes_root = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes_root {
            log::warn!("⚠️ 资源名称非法，已拒绝：{}", name);
            return None;
        }

        for root in &self.roots {
            let direct = root.join(relative);
            if relative.extension().is_some() && direct.is_file() {
                return Some(direct);
            }

            for ext in ASSET_EXTENSIONS {
                let candidate = direct.with_extension(ext);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }

        None
    }

    fn read_and_decode(&self, path: &Path) -> Option<Bitmap> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                log::warn!("⚠️ 无法读取资源信息 {}：{}", path.display(), err);
                return None;
            }
        };

        if metadata.len() > self.max_file_size {
            log::warn!(
                "⚠️ 资源文件过大，已跳过：{}（{:.2} MB）",
                path.display(),
                metadata.len() as f64 / 1024.0 / 1024.0
            );
            return None;
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("⚠️ 无法读取资源文件 {}：{}", path.display(), err);
                return None;
            }
        };

        match self.codec.decode(&bytes) {
            Ok(bitmap) => Some(bitmap),
            Err(err) => {
                log::warn!("⚠️ 资源解码失败 {}：{}", path.display(), err);
                None
            }
        }
    }
}

impl LocalAssetLoader for AssetDirectory {
    fn load_local(&self, name: &str) -> Option<Bitmap> {
        let Some(path) = self.resolve(name) else {
            log::debug!("📁 未找到本地资源：{}", name);
            return None;
        };

        log::info!("📁 读取本地资源 - 名称: {} 路径: {}", name, path.display());
        self.read_and_decode(&path)
    }
}
