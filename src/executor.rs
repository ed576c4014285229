//! # 投递执行器
//!
//! ## 设计思路
//!
//! 网络与解码在后台任务中完成，所有对调用方可见的投递（回调、目标赋值）
//! 统一切换到一个“主”执行上下文中串行执行。执行器可注入：
//!
//! - `InlineExecutor`：在调用线程同步执行，测试中使用
//! - `MainQueue` + `MainLoop`：由宿主主循环主动泵取（类似 UI 主线程）
//! - `SerialExecutor`：独立投递线程，按提交顺序串行执行（默认）
//!
//! 单个任务 panic 只记录日志，不影响后续任务。

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::thread;

use tokio::sync::mpsc as async_mpsc;

/// 投递任务。
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// 投递执行上下文。
pub trait DeliveryExecutor: Send + Sync {
    /// 提交一个任务；同一执行器上的任务按提交顺序串行执行。
    fn dispatch(&self, job: Job);
}

fn run_job(job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        log::error!("❌ 投递任务 panic，已跳过");
    }
}

/// 在提交线程上立即执行。
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl DeliveryExecutor for InlineExecutor {
    fn dispatch(&self, job: Job) {
        run_job(job);
    }
}

/// 主循环队列的提交端。
#[derive(Clone)]
pub struct MainQueue {
    sender: async_mpsc::UnboundedSender<Job>,
}

/// 主循环队列的执行端，由宿主线程持有并泵取。
pub struct MainLoop {
    receiver: async_mpsc::UnboundedReceiver<Job>,
}

impl MainQueue {
    pub fn new() -> (Self, MainLoop) {
        let (sender, receiver) = async_mpsc::unbounded_channel();
        (Self { sender }, MainLoop { receiver })
    }
}

impl DeliveryExecutor for MainQueue {
    fn dispatch(&self, job: Job) {
        if self.sender.send(job).is_err() {
            log::warn!("⚠️ 主循环已关闭，投递任务被丢弃");
        }
    }
}

impl MainLoop {
    /// 执行当前已排队的全部任务，不阻塞。返回执行数量。
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.receiver.try_recv() {
            run_job(job);
            count += 1;
        }
        count
    }

    /// 阻塞等待并执行下一个任务；所有提交端都已释放时返回 `false`。
    ///
    /// 不能在异步运行时线程中调用。
    pub fn run_next_blocking(&mut self) -> bool {
        match self.receiver.blocking_recv() {
            Some(job) => {
                run_job(job);
                true
            }
            None => false,
        }
    }

    /// 异步等待并执行下一个任务；所有提交端都已释放时返回 `false`。
    pub async fn run_next(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(job) => {
                run_job(job);
                true
            }
            None => false,
        }
    }
}

/// 独立线程串行执行。
pub struct SerialExecutor {
    sender: mpsc::Sender<Job>,
}

impl SerialExecutor {
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        thread::Builder::new().name(name.to_string()).spawn(move || {
            for job in receiver {
                run_job(job);
            }
            log::debug!("投递线程退出");
        })?;
        Ok(Self { sender })
    }
}

impl DeliveryExecutor for SerialExecutor {
    fn dispatch(&self, job: Job) {
        if self.sender.send(job).is_err() {
            log::warn!("⚠️ 投递线程已退出，投递任务被丢弃");
        }
    }
}
