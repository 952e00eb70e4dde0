/// 连接事件

use crate::codec::Message;
use crate::error::ConnectionError;

/// 异常关闭码（未收到关闭帧）
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// 关闭信息，对应传输层的 `(code, reason, wasClean)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>, was_clean: bool) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean,
        }
    }

    /// 传输在没有关闭握手的情况下结束
    pub fn abnormal() -> Self {
        Self::new(ABNORMAL_CLOSURE, "", false)
    }
}

/// 连接对外广播的事件
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Open,
    Error(ConnectionError),
    Message(Message),
    Close(CloseInfo),
}

impl ConnectionEvent {
    /// 事件名称，便于日志输出
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Error(_) => "error",
            Self::Message(_) => "message",
            Self::Close(_) => "close",
        }
    }
}
