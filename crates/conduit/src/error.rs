/// 错误定义
///
/// 编解码、传输、连接与调用四层错误，各自只向自己的调用方传播

use thiserror::Error;

use crate::event::CloseInfo;

/// 编解码错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("选项键过长: {len} 字节 (上限 255)")]
    KeyTooLong { len: usize },

    #[error("选项值过长: key={key}, {len} 字节 (上限 65535)")]
    ValueTooLong { key: String, len: usize },

    #[error("选项数量过多: {count} (上限 255)")]
    TooManyOptions { count: usize },

    #[error("负载过大: {len} 字节 (上限 65535)")]
    PayloadTooLarge { len: usize },

    /// 声明长度越界或文本不是合法 UTF-8
    #[error("消息格式错误 (offset={offset}): {reason}")]
    Malformed { offset: usize, reason: String },
}

impl CodecError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    /// 是否为入站消息格式错误
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

/// 传输层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("没有可用的传输实现")]
    Unavailable,

    #[error("传输已关闭")]
    Closed,

    #[error("传输错误: {0}")]
    Io(String),
}

/// 连接错误
///
/// 会随 `ConnectionEvent::Error` 广播，因此需要 `Clone`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("无法确定 WebSocket 实现，请显式提供 transport")]
    TransportUnavailable,

    /// 打开之后发生的传输错误会在关闭时补充关闭码和原因
    #[error("传输错误: {message}{}", describe_close(.close))]
    Transport {
        message: String,
        close: Option<CloseInfo>,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("连接尚未打开")]
    NotOpen,

    #[error("连接已关闭")]
    Closed,
}

impl ConnectionError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            close: None,
        }
    }
}

impl From<TransportError> for ConnectionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unavailable => Self::TransportUnavailable,
            TransportError::Closed => Self::Closed,
            TransportError::Io(message) => Self::transport(message),
        }
    }
}

fn describe_close(close: &Option<CloseInfo>) -> String {
    match close {
        Some(info) if info.reason.is_empty() => format!(" (code={})", info.code),
        Some(info) => format!(" (code={}, reason={})", info.code, info.reason),
        None => String::new(),
    }
}

/// 调用错误，只影响发起该调用的一方
#[derive(Error, Debug)]
pub enum CallError {
    /// 对端在响应中返回了 `err`
    #[error("{0}")]
    Remote(String),

    #[error("等待响应超时: {key}")]
    Timeout { key: String },

    #[error("连接已关闭")]
    ConnectionClosed,

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("响应解析失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 统一结果类型
pub type Result<T, E = CallError> = std::result::Result<T, E>;
