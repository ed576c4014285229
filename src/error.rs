//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载整条“获取 → 解码 → 变换 → 投递”链路中的所有失败来源，
//! 避免字符串拼接式错误处理。通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! ## 实现思路
//!
//! - 传输层错误（连接失败、超时、读取中断）统一归入 `Transport`，超时不是独立概念。
//! - 非 2xx 状态码归入 `HttpStatus`，携带状态码与本地化文案。
//! - 字节无法识别或无法解码归入 `Decode`。
//! - `code()` / `stage()` 提供稳定的机器可读标识，便于日志聚合与调用方分支。
//!
//! 本地资源缺失、未配置来源都**不是**错误，投递结果为 `Ok(None)`。

/// 图片链路统一错误类型。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    /// 连接失败、超时或响应体读取失败。
    #[error("网络错误：{0}")]
    Transport(String),

    /// 服务端返回非 2xx 状态码。
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: &'static str },

    /// 字节不是有效图片，或解码失败。
    #[error("解码错误：{0}")]
    Decode(String),

    /// 下载体积、像素数或解码内存超过配置上限。
    #[error("资源限制：{0}")]
    ResourceLimit(String),

    /// 构建下载器时配置非法。
    #[error("配置错误：{0}")]
    InvalidConfig(String),
}

impl ImageError {
    /// 根据状态码构造 `HttpStatus` 错误。
    pub fn http_status(status: u16) -> Self {
        Self::HttpStatus {
            status,
            message: status_message(status),
        }
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_TRANSPORT",
            Self::HttpStatus { .. } => "E_HTTP_STATUS",
            Self::Decode(_) => "E_DECODE",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::InvalidConfig(_) => "E_CONFIG",
        }
    }

    /// 出错阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Transport(_) | Self::HttpStatus { .. } => "fetch",
            Self::Decode(_) => "decode",
            Self::ResourceLimit(_) => "limit",
            Self::InvalidConfig(_) => "config",
        }
    }

    /// 非 2xx 状态码（如有）。
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 常见 HTTP 状态码本地化文案。
fn status_message(code: u16) -> &'static str {
    match code {
        400 => "请求无效",
        401 => "未授权",
        403 => "访问被拒绝",
        404 => "未找到",
        410 => "资源已删除",
        429 => "请求过于频繁",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}
