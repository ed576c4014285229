//! # 网络获取模块
//!
//! - `transport`：HTTP 传输抽象与 `reqwest` 实现
//! - `fetcher`：单次可取消的获取 + 解码

mod fetcher;
mod transport;

pub use fetcher::{FetchCallback, Fetcher};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, redact_url_for_log};
