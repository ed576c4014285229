//! 请求状态机。
//!
//! 状态以原子值保存，所有转换都是 CAS，竞争的一方必然失败：
//!
//! ```text
//! Ready ──begin──▶ Executing ──finish──▶ Finished
//!   │                  │
//!   └─────cancel───────┴──────▶ Cancelled
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
    Ready = 0,
    Executing = 1,
    Finished = 2,
    Cancelled = 3,
}

impl RequestState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Ready,
            1 => Self::Executing,
            2 => Self::Finished,
            _ => Self::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

#[derive(Debug)]
pub struct AtomicRequestState(AtomicU8);

impl AtomicRequestState {
    pub fn new() -> Self {
        Self(AtomicU8::new(RequestState::Ready as u8))
    }

    pub fn get(&self) -> RequestState {
        RequestState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn transition(&self, from: RequestState, to: RequestState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Ready → Executing。
    pub fn begin(&self) -> bool {
        self.transition(RequestState::Ready, RequestState::Executing)
    }

    /// Executing → Finished。失败说明已被取消，此时不得投递。
    pub fn finish(&self) -> bool {
        self.transition(RequestState::Executing, RequestState::Finished)
    }

    /// Ready / Executing → Cancelled。只有真正发生转换时返回 `true`。
    pub fn cancel(&self) -> bool {
        self.transition(RequestState::Ready, RequestState::Cancelled)
            || self.transition(RequestState::Executing, RequestState::Cancelled)
    }

    pub fn is_ready(&self) -> bool {
        self.get() == RequestState::Ready
    }

    pub fn is_cancelled(&self) -> bool {
        self.get() == RequestState::Cancelled
    }
}

impl Default for AtomicRequestState {
    fn default() -> Self {
        Self::new()
    }
}
