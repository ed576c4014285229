//! 集成测试共用夹具。
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageBuffer, ImageFormat, Rgba};
use image_courier::fetch::{HttpRequest, HttpResponse, HttpTransport};
use image_courier::{Bitmap, ImageError, ImageTarget, MainLoop, TargetId};
use tokio::sync::watch;

pub fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = ImageBuffer::from_fn(width, height, |x, y| {
        Rgba([(x % 255) as u8, (y % 255) as u8, 64u8, 255u8])
    });

    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("encode png for test failed");
    cursor.into_inner()
}

/// 按 URL 返回预置响应；`hold` 后所有请求挂起直到 `release`。
pub struct StubTransport {
    responses: Mutex<HashMap<String, (u16, Bytes)>>,
    calls: Mutex<HashMap<String, usize>>,
    gate: watch::Sender<bool>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            gate: watch::Sender::new(true),
        }
    }

    pub fn respond(&self, url: &str, status: u16, body: Vec<u8>) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(url.to_string(), (status, Bytes::from(body)));
    }

    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").values().sum()
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ImageError> {
        *self
            .calls
            .lock()
            .expect("calls lock")
            .entry(request.url.clone())
            .or_insert(0) += 1;

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let response = self
            .responses
            .lock()
            .expect("responses lock")
            .get(&request.url)
            .cloned();
        match response {
            Some((status, body)) => Ok(HttpResponse { status, body }),
            None => Err(ImageError::Transport(format!("无法连接：{}", request.url))),
        }
    }
}

pub struct RecordingTarget {
    id: TargetId,
    assigned: Mutex<Vec<Bitmap>>,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self {
            id: TargetId::next(),
            assigned: Mutex::new(Vec::new()),
        }
    }

    pub fn assigned(&self) -> Vec<Bitmap> {
        self.assigned.lock().expect("assigned lock").clone()
    }
}

impl ImageTarget for RecordingTarget {
    fn id(&self) -> TargetId {
        self.id
    }

    fn assign(&self, bitmap: Bitmap) {
        self.assigned.lock().expect("assigned lock").push(bitmap);
    }
}

/// 泵取主循环直到条件满足，5 秒超时。
pub async fn pump_until<F>(main_loop: &mut MainLoop, done: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            main_loop.run_next().await;
        }
    })
    .await
    .expect("delivery did not arrive in time");
}

/// 轮询直到条件满足，5 秒超时。
pub async fn wait_until<F>(done: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
