//! # image-courier：命令行入口
//!
//! 逐个加载参数中的图片（`http(s)://` 开头视为 URL，否则视为本地资源名），
//! 在主循环中接收投递并打印结果。
//!
//! 环境变量 `IMAGE_COURIER_CONFIG` 可指定 JSON 配置文件路径，
//! `IMAGE_COURIER_PROFILE`（quality / balanced / speed）覆盖其中的性能档位。

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image_courier::{
    Bitmap, Downloader, DownloaderConfig, ImagePerformanceProfile, ImageTarget, MainQueue, TargetId,
};

const CONFIG_ENV: &str = "IMAGE_COURIER_CONFIG";
const PROFILE_ENV: &str = "IMAGE_COURIER_PROFILE";

/// 把收到的图片打印到日志的目标。
struct ConsoleTarget {
    id: TargetId,
    label: String,
}

impl ImageTarget for ConsoleTarget {
    fn id(&self) -> TargetId {
        self.id
    }

    fn assign(&self, bitmap: Bitmap) {
        log::info!("🖼️ {} -> {}x{}", self.label, bitmap.width(), bitmap.height());
    }
}

fn load_config() -> Result<DownloaderConfig, image_courier::ImageError> {
    let mut config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => DownloaderConfig::load_from_path(&PathBuf::from(path))?,
        None => DownloaderConfig::default(),
    };
    if let Ok(profile) = std::env::var(PROFILE_ENV) {
        config.apply_performance_profile(ImagePerformanceProfile::parse(&profile)?);
    }
    Ok(config)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let sources: Vec<String> = std::env::args().skip(1).collect();
    if sources.is_empty() {
        eprintln!("用法：image-courier <URL 或资源名>...");
        return ExitCode::from(2);
    }

    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            log::error!("❌ 配置加载失败 [{}]：{}", err.code(), err);
            return ExitCode::FAILURE;
        }
    };

    let (queue, mut main_loop) = MainQueue::new();
    let downloader = match Downloader::builder()
        .config(config)
        .executor(Arc::new(queue))
        .build()
    {
        Ok(downloader) => downloader,
        Err(err) => {
            log::error!("❌ 下载器初始化失败 [{}]：{}", err.code(), err);
            return ExitCode::FAILURE;
        }
    };

    let remaining = Arc::new(AtomicUsize::new(sources.len()));
    let failures = Arc::new(AtomicUsize::new(0));

    for source in sources {
        let request = if source.starts_with("http://") || source.starts_with("https://") {
            downloader.load_url(source.clone())
        } else {
            downloader.load_named(source.clone())
        };

        let target = Arc::new(ConsoleTarget {
            id: TargetId::next(),
            label: source.clone(),
        });
        let remaining = Arc::clone(&remaining);
        let failures = Arc::clone(&failures);

        request.into(target, move |result| {
            match result {
                Ok(Some(_)) => {}
                Ok(None) => log::warn!("⚠️ {}：没有可展示的图片", source),
                Err(err) => {
                    log::error!("❌ {} [{}/{}]：{}", source, err.stage(), err.code(), err);
                    failures.fetch_add(1, Ordering::SeqCst);
                }
            }
            remaining.fetch_sub(1, Ordering::SeqCst);
        });
    }

    while remaining.load(Ordering::SeqCst) > 0 {
        if !main_loop.run_next_blocking() {
            break;
        }
    }

    if failures.load(Ordering::SeqCst) > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
