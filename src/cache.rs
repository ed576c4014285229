//! # 内存图片缓存
//!
//! ## 设计思路
//!
//! 以远程 URL 为键、图片句柄为值的容量受限缓存，淘汰策略为 LRU（`lru`）。
//! 本地资源不进入缓存。
//!
//! ## 实现思路
//!
//! - 内部使用 `Arc<Mutex<LruCache>>`，克隆后共享同一份数据，可在任意线程读写。
//! - 容量可在运行时调整，缩小容量会立即淘汰最久未使用的条目。
//! - 容量为 0 表示不限容量。
//! - 锁中毒时读取返回未命中、写入静默跳过，不让缓存故障影响主链路。

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::config::DEFAULT_CACHE_LIMIT;
use crate::imaging::Bitmap;

fn to_capacity(limit: usize) -> NonZeroUsize {
    NonZeroUsize::new(limit).unwrap_or(NonZeroUsize::MAX)
}

/// 容量受限的图片缓存。
#[derive(Clone)]
pub struct BoundedCache {
    entries: Arc<Mutex<LruCache<String, Bitmap>>>,
}

impl BoundedCache {
    pub fn new(limit: usize) -> Self {
        let entries = match NonZeroUsize::new(limit) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Bitmap> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, bitmap: Bitmap) {
        if let Ok(mut cache) = self.entries.lock() {
            cache.put(key.into(), bitmap);
        }
    }

    pub fn remove(&self, key: &str) -> Option<Bitmap> {
        self.entries.lock().ok()?.pop(key)
    }

    /// 不更新 LRU 顺序的存在性检查。
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|cache| cache.contains(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前容量；不限容量时返回 0。
    pub fn capacity(&self) -> usize {
        self.entries
            .lock()
            .map(|cache| {
                let cap = cache.cap();
                if cap == NonZeroUsize::MAX { 0 } else { cap.get() }
            })
            .unwrap_or(0)
    }

    /// 调整容量，缩小时立即淘汰多余条目。
    pub fn set_capacity(&self, limit: usize) {
        if let Ok(mut cache) = self.entries.lock() {
            cache.resize(to_capacity(limit));
            log::debug!("🗃️ 缓存容量调整为 {}（当前 {} 条）", limit, cache.len());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.entries.lock() {
            cache.clear();
        }
    }
}

impl Default for BoundedCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_LIMIT)
    }
}
