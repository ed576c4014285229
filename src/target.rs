//! 投递目标。
//!
//! 目标只以不透明的 `TargetId` 参与注册表的“每个目标至多一个请求”约束；
//! 注册表从不持有目标本身。

use std::sync::atomic::{AtomicU64, Ordering};

use crate::imaging::Bitmap;

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// 目标标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// 分配一个进程内唯一的新标识。
    pub fn next() -> Self {
        Self(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// 由宿主自行管理标识（如视图指针或句柄）。
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// 接收图片的消费者，例如一个视图。
pub trait ImageTarget: Send + Sync {
    fn id(&self) -> TargetId;

    /// 只会在投递执行器上调用。
    fn assign(&self, bitmap: Bitmap);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_ids_are_unique() {
        let a = TargetId::next();
        let b = TargetId::next();

        assert_ne!(a, b);
        assert_eq!(TargetId::from_raw(a.as_raw()), a);
    }
}
