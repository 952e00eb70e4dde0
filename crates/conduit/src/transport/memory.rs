/// 内存传输
///
/// 客户端一侧实现 `Transport`，另一侧以 `MemoryPeer` 的形式交给调用方扮演服务端，
/// 用于测试和进程内集成

use tokio::sync::mpsc;
use tracing::warn;

use super::{Transport, TransportData, TransportEvent, TransportEvents, TransportFactory};
use crate::codec::{decode_message, Message};
use crate::error::TransportError;
use crate::event::CloseInfo;

/// 客户端发往对端的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFrame {
    Bytes(Vec<u8>),
    /// 客户端请求关闭
    Close,
}

/// 内存传输工厂，每次 `open` 产生一个新的 `MemoryPeer`
#[derive(Debug, Clone)]
pub struct MemoryTransportFactory {
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// 接收新建立的内存连接
#[derive(Debug)]
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryTransportFactory {
    pub fn new() -> (Self, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { peers: tx }, MemoryListener { peers: rx })
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn open(&self, url: &str) -> Result<(Box<dyn Transport>, TransportEvents), TransportError> {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            url: url.to_string(),
            frames: frame_rx,
            events: event_tx,
        };
        self.peers.send(peer).map_err(|_| TransportError::Unavailable)?;

        Ok((Box::new(MemoryTransport { frames: frame_tx }), event_rx))
    }
}

impl MemoryListener {
    /// 等待下一个连接
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }
}

struct MemoryTransport {
    frames: mpsc::UnboundedSender<PeerFrame>,
}

impl Transport for MemoryTransport {
    fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.frames
            .send(PeerFrame::Bytes(bytes))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.frames.send(PeerFrame::Close);
    }
}

/// 内存连接的对端
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    frames: mpsc::UnboundedReceiver<PeerFrame>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryPeer {
    /// 客户端请求的 URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 向客户端注入任意传输事件
    pub fn emit(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.events.send(event).map_err(|_| TransportError::Closed)
    }

    pub fn open(&self) -> Result<(), TransportError> {
        self.emit(TransportEvent::Open)
    }

    pub fn error(&self, message: impl Into<String>) -> Result<(), TransportError> {
        self.emit(TransportEvent::Error(message.into()))
    }

    pub fn close(&self, code: u16, reason: impl Into<String>) -> Result<(), TransportError> {
        self.emit(TransportEvent::Close(CloseInfo::new(code, reason, true)))
    }

    /// 编码并发送一条消息
    pub fn send(&self, message: &Message) -> Result<(), TransportError> {
        let bytes = message
            .encode()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.emit(TransportEvent::Message(TransportData::Binary(bytes)))
    }

    /// 发送原始数据（可以是不合法的消息）
    pub fn send_raw(&self, data: TransportData) -> Result<(), TransportError> {
        self.emit(TransportEvent::Message(data))
    }

    /// 下一个来自客户端的帧；客户端丢弃传输后返回 `None`
    pub async fn recv_frame(&mut self) -> Option<PeerFrame> {
        self.frames.recv().await
    }

    /// 下一条来自客户端的消息；遇到关闭请求或连接结束时返回 `None`
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.frames.recv().await? {
                PeerFrame::Bytes(bytes) => match decode_message(&bytes) {
                    Ok(message) => return Some(message),
                    Err(e) => warn!("内存对端收到无法解码的数据: {}", e),
                },
                PeerFrame::Close => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Options;

    #[tokio::test]
    async fn test_memory_pair() {
        let (factory, mut listener) = MemoryTransportFactory::new();
        let (transport, mut events) = factory.open("mem://local/1/0?key=k").unwrap();
        let mut peer = listener.accept().await.unwrap();
        assert_eq!(peer.url(), "mem://local/1/0?key=k");

        let message = Message::new(Options::new().with("token", "t1"), b"hi".to_vec());
        transport.send(message.encode().unwrap()).unwrap();
        assert_eq!(peer.recv().await, Some(message.clone()));

        peer.open().unwrap();
        peer.send(&message).unwrap();
        assert_eq!(events.recv().await, Some(TransportEvent::Open));
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Message(TransportData::Binary(
                message.encode().unwrap()
            )))
        );

        transport.close();
        assert_eq!(peer.recv_frame().await, Some(PeerFrame::Close));
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped() {
        let (factory, mut listener) = MemoryTransportFactory::new();
        let (transport, _events) = factory.open("mem://local").unwrap();
        drop(listener.accept().await.unwrap());
        assert_eq!(transport.send(vec![0, 0, 0]), Err(TransportError::Closed));
    }
}
