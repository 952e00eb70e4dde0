/// 连接
///
/// 独占一个传输句柄，把传输的 open / error / close / message
/// 转换为连接自身的状态与事件

mod dispatcher;
pub(crate) mod pending;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::codec::{encode_message, Options};
use crate::error::{CallError, ConnectionError};
use crate::event::ConnectionEvent;
use crate::transport::{Transport, TransportFactory};

use dispatcher::{Dispatcher, Shared};
use pending::{Correlation, Waiter};

/// 事件广播通道容量
const EVENT_CAPACITY: usize = 256;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Unopened,
    Opening,
    Opened,
    Closed,
}

/// 状态快照；`errored` 与 `state` 相互独立
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub errored: bool,
    pub last_error: Option<ConnectionError>,
}

/// 连接参数
#[derive(Clone)]
pub struct ConnectionOptions {
    pub id: u32,
    pub key: String,
    pub origin: String,
    pub transport: Arc<dyn TransportFactory>,
}

/// 与服务端的单个会话，关闭后不可复用
pub struct Connection {
    id: u32,
    key: String,
    origin: String,
    factory: Arc<dyn TransportFactory>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    shared: Arc<Shared>,
}

impl Connection {
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            id: options.id,
            key: options.key,
            origin: options.origin,
            factory: options.transport,
            transport: Mutex::new(None),
            shared: Arc::new(Shared::new(EVENT_CAPACITY)),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// 连接地址：`<origin>/<id>/0?key=<key>`
    pub fn url(&self) -> String {
        connection_url(&self.origin, self.id, &self.key)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    pub fn is_errored(&self) -> bool {
        self.shared.status.borrow().errored
    }

    pub fn last_error(&self) -> Option<ConnectionError> {
        self.shared.status.borrow().last_error.clone()
    }

    /// 订阅连接事件
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// 等待中的调用数与分块确认数
    pub fn pending_count(&self) -> (usize, usize) {
        self.shared.pending.counts()
    }

    fn handle(&self) -> MutexGuard<'_, Option<Arc<dyn Transport>>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 创建传输并启动分发任务；已有传输时不做任何事
    ///
    /// 必须在 tokio 运行时中调用
    pub fn start(&self) -> Result<(), ConnectionError> {
        let mut handle = self.handle();
        if handle.is_some() {
            return Ok(());
        }

        let url = self.url();
        info!("打开连接: id={}, url={}", self.id, url);

        let (transport, events) = self.factory.open(&url)?;
        *handle = Some(Arc::from(transport));
        self.shared.set_state(ConnectionState::Opening);

        tokio::spawn(Dispatcher::new(self.shared.clone(), self.id).run(events));
        Ok(())
    }

    /// 打开连接并等待握手结果
    ///
    /// 打开前出现的错误或关闭都会使其失败
    pub async fn open(&self) -> Result<(), ConnectionError> {
        self.start()?;

        let mut status = self.shared.status.subscribe();
        let settled = status
            .wait_for(|s| match s.state {
                ConnectionState::Opened | ConnectionState::Closed => true,
                ConnectionState::Opening => s.errored,
                ConnectionState::Unopened => false,
            })
            .await
            .map_err(|_| ConnectionError::Closed)?;

        match settled.state {
            ConnectionState::Opened => Ok(()),
            _ => Err(settled.last_error.clone().unwrap_or(ConnectionError::Closed)),
        }
    }

    /// 编码并发送一条消息
    pub fn send(&self, options: &Options, payload: &[u8]) -> Result<(), ConnectionError> {
        let transport = self.handle().clone().ok_or(ConnectionError::NotOpen)?;
        if self.state() == ConnectionState::Closed {
            return Err(ConnectionError::Closed);
        }

        let bytes = encode_message(options, payload)?;
        debug!(
            "发送消息: options={}, payload={} 字节",
            options.len(),
            payload.len()
        );
        transport.send(bytes).map_err(ConnectionError::from)
    }

    /// 请求关闭并等待关闭完成
    pub async fn close(&self) {
        let transport = match self.handle().clone() {
            Some(transport) => transport,
            None => return,
        };

        let mut status = self.shared.status.subscribe();
        if status.borrow().state != ConnectionState::Closed {
            debug!("请求关闭连接 {}", self.id);
            transport.close();
        }
        let _ = status
            .wait_for(|s| s.state == ConnectionState::Closed)
            .await;
    }

    pub(crate) fn expect(&self, kind: Correlation, key: &str) -> Result<Waiter, CallError> {
        self.shared.pending.register(kind, key)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(transport) = self.handle().take() {
            if self.shared.state() != ConnectionState::Closed {
                transport.close();
            }
        }
    }
}

/// 构造连接地址
///
/// origin 上的路径、查询和片段都会被替换；key 按查询串规则转义
pub fn connection_url(origin: &str, id: u32, key: &str) -> String {
    let base = origin.trim_end_matches('/');
    let authority_start = base.find("://").map(|i| i + 3).unwrap_or(0);
    let base = match base[authority_start..].find(|c| matches!(c, '/' | '?' | '#')) {
        Some(end) => &base[..authority_start + end],
        None => base,
    };
    format!("{}/{}/0?key={}", base, id, encode_query_value(key))
}

fn encode_query_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'!' | b'$'..=b'&' | b'('..=b';' | b'=' | b'?'..=b'~' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
