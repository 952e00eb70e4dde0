/// 调用引擎
///
/// 在连接之上实现按令牌关联的请求/响应调用，以及带摘要确认的分块上传

pub mod reply;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use reply::{Reply, ReplyType};

use crate::chunk::{split_buffer, DEFAULT_HIGH_WATER_MARK};
use crate::codec::{keys, Options};
use crate::connection::pending::Correlation;
use crate::connection::{Connection, ConnectionOptions};
use crate::digest::{ChunkDigest, Sha1Digest};
use crate::error::{CallError, ConnectionError};
use crate::event::ConnectionEvent;
use crate::random::{RandomSource, ThreadRandom};
use crate::transport::{self, TransportFactory};

/// 由调用引擎写入、调用方不能覆盖的选项
const RESERVED_KEYS: [&str; 3] = [keys::ROUTE, keys::TOKEN, keys::IPC_TOKEN];

/// 连接参数
#[derive(Clone)]
pub struct ConnectOptions {
    /// 连接 ID，缺省时随机生成
    pub id: Option<u32>,
    pub key: String,
    pub origin: String,
    /// 传输工厂，缺省时使用默认实现
    pub transport: Option<Arc<dyn TransportFactory>>,
    pub digest: Arc<dyn ChunkDigest>,
    pub random: Arc<dyn RandomSource>,
    /// 每次等待（分块确认、最终响应）的超时，`None` 表示一直等待
    pub call_timeout: Option<Duration>,
}

impl ConnectOptions {
    pub fn new(origin: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: None,
            key: key.into(),
            origin: origin.into(),
            transport: None,
            digest: Arc::new(Sha1Digest),
            random: Arc::new(ThreadRandom),
            call_timeout: None,
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn TransportFactory>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_digest(mut self, digest: Arc<dyn ChunkDigest>) -> Self {
        self.digest = digest;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// 客户端
#[derive(Clone)]
pub struct Client {
    connection: Arc<Connection>,
    digest: Arc<dyn ChunkDigest>,
    random: Arc<dyn RandomSource>,
    call_timeout: Option<Duration>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.connection.id())
            .field("state", &self.connection.state())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

/// 连接到服务端，等待握手完成
pub async fn connect(options: ConnectOptions) -> Result<Client, ConnectionError> {
    Client::connect(options).await
}

impl Client {
    /// 连接到服务端，等待握手完成
    pub async fn connect(options: ConnectOptions) -> Result<Self, ConnectionError> {
        let transport = options
            .transport
            .or_else(transport::default_factory)
            .ok_or(ConnectionError::TransportUnavailable)?;
        let id = options.id.unwrap_or_else(|| options.random.next_u32());

        let connection = Arc::new(Connection::new(ConnectionOptions {
            id,
            key: options.key,
            origin: options.origin,
            transport,
        }));
        connection.open().await?;

        Ok(Self {
            connection,
            digest: options.digest,
            random: options.random,
            call_timeout: options.call_timeout,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn id(&self) -> u32 {
        self.connection.id()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.subscribe()
    }

    /// 单向发送，不做关联
    pub fn send(&self, options: &Options, payload: &[u8]) -> Result<(), ConnectionError> {
        self.connection.send(options, payload)
    }

    /// 远程调用
    ///
    /// 提供负载时先逐块上传（每块等待摘要确认），再发送命令消息并等待同令牌的响应。
    /// 选项 `type = "arraybuffer"` 表示返回原始负载，该选项不会发送。
    pub async fn call(
        &self,
        command: &str,
        mut options: Options,
        payload: Option<&[u8]>,
    ) -> Result<Reply, CallError> {
        let token = self.random.token();
        let reply_type = ReplyType::from_option(options.remove(keys::TYPE).as_deref());

        if let Some(payload) = payload {
            self.upload(payload).await?;
        }

        let mut message = Options::new()
            .with(keys::ROUTE, command)
            .with(keys::TOKEN, &token)
            .with(keys::IPC_TOKEN, &token);
        for (key, value) in options {
            if RESERVED_KEYS.contains(&key.as_str()) {
                warn!("忽略调用方提供的保留选项: {}={}", key, value);
                continue;
            }
            message.insert(key, value);
        }

        // 先登记再发送，避免响应先于登记到达
        let waiter = self.connection.expect(Correlation::Reply, &token)?;
        debug!("📤 发起调用: route={}, token={}", command, token);
        self.connection.send(&message, &[])?;

        let reply = waiter.wait(self.call_timeout).await?;
        debug!(
            "📥 收到响应: route={}, token={}, payload={} 字节",
            command,
            token,
            reply.payload.len()
        );

        reply::interpret(reply.payload, reply_type)
    }

    /// 逐块上传，一次只有一块在途
    async fn upload(&self, payload: &[u8]) -> Result<(), CallError> {
        let chunks = split_buffer(payload, DEFAULT_HIGH_WATER_MARK);
        let total = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            if chunk.is_empty() {
                continue;
            }

            let digest = self.digest.digest(chunk);
            let waiter = self.connection.expect(Correlation::Ack, &digest)?;
            self.connection
                .send(&Options::new().with(keys::DIGEST, &digest), chunk)?;
            waiter.wait(self.call_timeout).await?;

            debug!(
                "分块已确认: {}/{}, {} 字节, digest={}",
                index + 1,
                total,
                chunk.len(),
                digest
            );
        }

        Ok(())
    }

    /// 关闭连接并等待关闭完成
    pub async fn close(&self) {
        info!("关闭客户端 {}", self.id());
        self.connection.close().await;
    }
}
