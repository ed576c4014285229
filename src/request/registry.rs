//! # 目标注册表
//!
//! ## 设计思路
//!
//! 维护“目标 → 当前请求”的映射，保证每个目标同一时刻至多一个请求在执行：
//! 同一目标上的新请求会先取消旧请求再覆盖映射。
//!
//! ## 实现思路
//!
//! - 映射由 `Mutex<HashMap>` 保护；取消旧请求一律在释放锁之后进行，
//!   因为取消会回调注册表做清理。
//! - 所有移除操作都是幂等的，取消与完成并发时安全。
//! - 请求到达终态时调用 `finish_request`，只有映射仍指向自己时才移除，
//!   过期请求不会误删后继请求的登记。

use std::collections::HashMap;
use std::sync::Mutex;

use super::RequestHandle;
use crate::target::TargetId;

#[derive(Default)]
pub struct Registry {
    operations: Mutex<HashMap<TargetId, RequestHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记目标的新请求；已有的其他请求被取消并覆盖。
    pub fn register_operation(&self, target: TargetId, request: RequestHandle) {
        let previous = match self.operations.lock() {
            Ok(mut operations) => operations
                .insert(target, request.clone())
                .filter(|previous| previous.id() != request.id()),
            Err(_) => {
                log::warn!("⚠️ 注册表锁已中毒，跳过登记");
                None
            }
        };

        if let Some(previous) = previous {
            log::debug!("🔁 目标 {:?} 上的请求 #{} 被 #{} 取代", target, previous.id(), request.id());
            previous.cancel();
        }
    }

    /// 取消并移除目标的请求；不存在时无操作。
    pub fn cancel_operation(&self, target: TargetId) {
        let removed = self
            .operations
            .lock()
            .ok()
            .and_then(|mut operations| operations.remove(&target));

        if let Some(request) = removed {
            log::debug!("🚫 取消目标 {:?} 上的请求 #{}", target, request.id());
            request.cancel();
        }
    }

    /// 无条件移除目标的登记。
    pub fn finish(&self, target: TargetId) {
        if let Ok(mut operations) = self.operations.lock() {
            operations.remove(&target);
        }
    }

    /// 仅当目标仍登记为指定请求时移除。
    pub fn finish_request(&self, target: TargetId, request_id: u64) {
        if let Ok(mut operations) = self.operations.lock() {
            if operations.get(&target).map(|r| r.id()) == Some(request_id) {
                operations.remove(&target);
            }
        }
    }

    pub fn is_tracking(&self, target: TargetId) -> bool {
        self.operations
            .lock()
            .map(|operations| operations.contains_key(&target))
            .unwrap_or(false)
    }

    /// 目标当前登记的请求。
    pub fn current(&self, target: TargetId) -> Option<RequestHandle> {
        self.operations.lock().ok()?.get(&target).cloned()
    }

    pub fn len(&self) -> usize {
        self.operations.lock().map(|operations| operations.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
