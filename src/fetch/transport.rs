//! # HTTP 传输模块
//!
//! ## 设计思路
//!
//! 核心链路只依赖 `HttpTransport` 这一抽象：给定方法、URL 与请求头，异步返回状态码与原始字节。
//! 生产实现基于 `reqwest`，测试中可替换为桩实现。
//!
//! ## 实现思路
//!
//! - 客户端在构造时一次性创建并复用（连接池），超时由客户端统一负责。
//! - 先按 `Content-Length` 快速拒绝超大响应，再流式读取并累计校验体积。
//! - 非 2xx 状态码**不**在这里转成错误，交由上层按状态码构造 `HttpStatus`；
//!   此时不读取响应体，错误页的大小与完整性不影响状态码的上报。
//! - 调用方请求头覆盖同名默认头（如 `Accept`），而不是追加。
//! - 日志中的 URL 去掉 query 与 fragment，避免泄露签名参数。

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};

use crate::config::DownloaderConfig;
use crate::error::ImageError;

const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;
const ACCEPT_IMAGES: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";

/// 一次出站请求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, headers: BTreeMap<String, String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers,
        }
    }
}

/// 传输层响应：状态码 + 完整响应体。
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP 传输能力，需支持多路并发调用。
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ImageError>;
}

/// 基于 `reqwest` 的默认传输实现。
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout_secs: u64,
    max_body_size: u64,
}

impl ReqwestTransport {
    pub fn new(config: &DownloaderConfig) -> Result<Self, ImageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ImageError::InvalidConfig(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self {
            client,
            timeout_secs: config.download_timeout,
            max_body_size: config.max_file_size,
        })
    }

    async fn read_body(&self, mut response: reqwest::Response, url: &str) -> Result<Bytes, ImageError> {
        let total_len = response.content_length();
        if let Some(size) = total_len {
            if size > self.max_body_size {
                return Err(ImageError::ResourceLimit(format!(
                    "文件过大：{}（限制：{}）",
                    format_size(size),
                    format_size(self.max_body_size)
                )));
            }
        }

        let initial_capacity = total_len
            .map(|len| len.min(self.max_body_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = BytesMut::with_capacity(initial_capacity);

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.map_reqwest_error(e, url))?
        {
            if (buffer.len() + chunk.len()) as u64 > self.max_body_size {
                return Err(ImageError::ResourceLimit(format!(
                    "下载后文件超过大小限制（{}）",
                    format_size(self.max_body_size)
                )));
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer.freeze())
    }

    /// 统一映射 reqwest 错误；超时同样归入传输错误。
    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> ImageError {
        let err_msg = e.to_string().replace(url, &redact_url_for_log(url));

        if e.is_timeout() {
            ImageError::Transport(format!("下载超时（{}秒）", self.timeout_secs))
        } else if e.is_connect() {
            ImageError::Transport(format!("无法连接：{}", err_msg))
        } else {
            ImageError::Transport(format!("请求失败：{}", err_msg))
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ImageError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| ImageError::Transport(format!("URL 格式错误：{}", e)))?;

        log::debug!("📡 发送 HTTP 请求 - {} {}", request.method, redact_url_for_log(&request.url));

        let headers = build_headers(&request.headers)?;
        let response = self
            .client
            .request(request.method.clone(), url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e, &request.url))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            log::debug!("📭 HTTP {}，跳过响应体 - {}", status, redact_url_for_log(&request.url));
            return Ok(HttpResponse { status, body: Bytes::new() });
        }
        let body = self.read_body(response, &request.url).await?;

        log::debug!("✅ 响应完成 - HTTP {} {} bytes", status, body.len());
        Ok(HttpResponse { status, body })
    }
}

/// 默认 `Accept` 在前，调用方同名头覆盖之。
fn build_headers(extra: &BTreeMap<String, String>) -> Result<HeaderMap, ImageError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_IMAGES));

    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ImageError::Transport(format!("请求头名称无效 {}：{}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ImageError::Transport(format!("请求头 {} 的值无效：{}", name, e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// 体积展示：不足 1 MB 时按 KB/字节显示，避免出现 "0.00 MB"。
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} 字节", bytes)
    }
}

/// 日志用 URL：只保留 scheme、host、port、path。
pub fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = parsed.path();

    format!("{}://{}{}{}", parsed.scheme(), host, port, path)
}
