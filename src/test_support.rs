//! 单元测试共用的桩实现与夹具。

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageBuffer, ImageFormat, Rgba};
use tokio::sync::watch;

use crate::config::CacheMode;
use crate::downloader::Downloader;
use crate::error::ImageError;
use crate::executor::InlineExecutor;
use crate::fetch::{HttpRequest, HttpResponse, HttpTransport};
use crate::imaging::Bitmap;
use crate::target::{ImageTarget, TargetId};

pub(crate) fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = ImageBuffer::from_fn(width, height, |x, y| {
        Rgba([(x % 255) as u8, (y % 255) as u8, 128u8, 255u8])
    });

    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("encode png for test failed");
    cursor.into_inner()
}

pub(crate) fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let dir = std::env::temp_dir().join(format!(
        "image-courier-{}-{}-{}",
        prefix,
        std::process::id(),
        nanos
    ));
    std::fs::create_dir_all(&dir).expect("create temp dir failed");
    dir
}

/// 按 URL 返回预置响应的传输桩，记录调用次数；`hold` 后请求挂起直到 `release`。
pub(crate) struct StubTransport {
    responses: Mutex<HashMap<String, (u16, Bytes)>>,
    calls: Mutex<HashMap<String, usize>>,
    requests: Mutex<HashMap<String, HttpRequest>>,
    gate: watch::Sender<bool>,
}

impl StubTransport {
    pub(crate) fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
            gate: watch::Sender::new(true),
        }
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: Vec<u8>) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(url.to_string(), (status, Bytes::from(body)));
    }

    pub(crate) fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub(crate) fn release(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn last_request(&self, url: &str) -> Option<HttpRequest> {
        self.requests.lock().expect("requests lock").get(url).cloned()
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
        self.requests
            .lock()
            .expect("requests lock")
            .insert(request.url.clone(), request.clone());

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

/// 记录所有赋值的目标。
pub(crate) struct RecordingTarget {
    id: TargetId,
    assigned: Mutex<Vec<Bitmap>>,
}

impl RecordingTarget {
    pub(crate) fn new() -> Self {
        Self {
            id: TargetId::next(),
            assigned: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn assigned(&self) -> Vec<Bitmap> {
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

/// 使用桩传输与同步执行器的下载器；需在 tokio 运行时内调用。
pub(crate) fn downloader_with(
    transport: StubTransport,
    cache_mode: CacheMode,
) -> (Downloader, Arc<StubTransport>) {
    let transport = Arc::new(transport);
    let downloader = Downloader::builder()
        .transport(transport.clone())
        .executor(Arc::new(InlineExecutor))
        .cache_mode(cache_mode)
        .build()
        .expect("build test downloader failed");
    (downloader, transport)
}

pub(crate) fn test_downloader() -> (Downloader, Arc<StubTransport>) {
    downloader_with(StubTransport::new(), CacheMode::Originals)
}
