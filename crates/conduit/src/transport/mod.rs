/// 传输层抽象
///
/// 传输负责收发字节并以事件形式报告 open / error / close / message，
/// 连接层只依赖这里的 trait

pub mod memory;
#[cfg(feature = "websocket")]
pub mod websocket;

use std::sync::Arc;

use tokio::sync::mpsc;

pub use crate::error::TransportError;
use crate::event::CloseInfo;

#[cfg(feature = "websocket")]
pub use websocket::WsTransportFactory;

/// 入站数据：二进制帧或文本帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportData {
    Binary(Vec<u8>),
    Text(String),
}

impl TransportData {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Binary(bytes) => bytes,
            Self::Text(text) => text.into_bytes(),
        }
    }
}

/// 传输事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Error(String),
    Close(CloseInfo),
    Message(TransportData),
}

/// 传输事件接收端
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// 已建立（或正在建立）的传输句柄
pub trait Transport: Send + Sync {
    /// 发送一帧二进制数据，不做流控
    fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// 请求关闭，关闭完成后事件流会产生 `Close`
    fn close(&self);
}

/// 按 URL 创建传输
pub trait TransportFactory: Send + Sync {
    fn open(&self, url: &str) -> Result<(Box<dyn Transport>, TransportEvents), TransportError>;
}

/// 默认传输实现（启用 `websocket` 特性时为 WebSocket）
pub fn default_factory() -> Option<Arc<dyn TransportFactory>> {
    #[cfg(feature = "websocket")]
    {
        Some(Arc::new(WsTransportFactory))
    }
    #[cfg(not(feature = "websocket"))]
    {
        None
    }
}
