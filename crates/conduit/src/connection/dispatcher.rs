/// 入站事件分发
///
/// 每个连接一个分发任务，按传输事件的到达顺序更新状态、
/// 解码消息、唤醒等待者并广播连接事件

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use super::pending::PendingTable;
use super::{ConnectionState, ConnectionStatus};
use crate::codec::decode_message;
use crate::error::ConnectionError;
use crate::event::{CloseInfo, ConnectionEvent};
use crate::transport::{TransportData, TransportEvent, TransportEvents};

/// 连接与分发任务共享的状态
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) status: watch::Sender<ConnectionStatus>,
    pub(crate) events: broadcast::Sender<ConnectionEvent>,
    pub(crate) pending: PendingTable,
}

impl Shared {
    pub(crate) fn new(event_capacity: usize) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            status,
            events,
            pending: PendingTable::default(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.status.send_modify(|status| status.state = state);
    }

    fn record_error(&self, err: &ConnectionError) {
        self.status.send_modify(|status| {
            status.errored = true;
            status.last_error = Some(err.clone());
        });
    }

    fn emit(&self, event: ConnectionEvent) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.events.send(event);
    }
}

pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    id: u32,
    opened: bool,
    /// 打开之后记录、尚未对外发出的传输错误
    deferred: Option<String>,
}

impl Dispatcher {
    pub(crate) fn new(shared: Arc<Shared>, id: u32) -> Self {
        Self {
            shared,
            id,
            opened: false,
            deferred: None,
        }
    }

    pub(crate) async fn run(mut self, mut events: TransportEvents) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Open => self.on_open(),
                TransportEvent::Error(message) => self.on_error(message),
                TransportEvent::Message(data) => self.on_message(data),
                TransportEvent::Close(info) => {
                    self.on_close(info);
                    return;
                }
            }
        }

        debug!("连接 {} 的传输事件流已结束，按异常关闭处理", self.id);
        self.on_close(CloseInfo::abnormal());
    }

    fn on_open(&mut self) {
        if self.opened {
            warn!("连接 {} 收到重复的 open 事件", self.id);
            return;
        }
        self.opened = true;
        self.shared.set_state(ConnectionState::Opened);
        info!("✅ 连接 {} 已打开", self.id);
        self.shared.emit(ConnectionEvent::Open);
    }

    fn on_error(&mut self, message: String) {
        let err = ConnectionError::transport(message.clone());
        self.shared.record_error(&err);

        if self.opened {
            // 等到关闭时带上关闭码一起发出
            warn!("连接 {} 传输错误（延迟到关闭时上报）: {}", self.id, message);
            self.deferred = Some(message);
        } else {
            error!("连接 {} 打开前发生传输错误: {}", self.id, message);
            self.shared.emit(ConnectionEvent::Error(err));
        }
    }

    fn on_message(&mut self, data: TransportData) {
        let bytes = data.into_bytes();
        let message = match decode_message(&bytes) {
            Ok(message) => message,
            Err(e) => {
                error!("连接 {} 收到无法解码的消息，已丢弃: {}", self.id, e);
                let err = ConnectionError::Codec(e);
                self.shared.record_error(&err);
                self.shared.emit(ConnectionEvent::Error(err));
                return;
            }
        };

        debug!(
            "收到消息: token={:?}, digest={:?}, payload={} 字节",
            message.token(),
            message.digest(),
            message.payload.len()
        );

        if let Some(kind) = self.shared.pending.resolve(&message) {
            debug!("消息已匹配等待者: {:?}", kind);
        }
        self.shared.emit(ConnectionEvent::Message(message));
    }

    fn on_close(&mut self, info: CloseInfo) {
        if let Some(message) = self.deferred.take() {
            let err = ConnectionError::Transport {
                message,
                close: Some(info.clone()),
            };
            self.shared.record_error(&err);
            self.shared.emit(ConnectionEvent::Error(err));
        }

        self.shared.set_state(ConnectionState::Closed);

        let dropped = self.shared.pending.close();
        if dropped > 0 {
            warn!("连接 {} 关闭，{} 个等待中的请求被取消", self.id, dropped);
        }

        info!(
            "连接 {} 已关闭: code={}, reason={}, clean={}",
            self.id, info.code, info.reason, info.was_clean
        );
        self.shared.emit(ConnectionEvent::Close(info));
    }
}
