/// Conduit - 客户端库
///
/// 基于 WebSocket 的选项/负载二进制消息协议：消息编解码、按令牌关联的远程调用、
/// 带摘要确认的分块上传

pub mod chunk;
pub mod client;
pub mod codec;
pub mod connection;
pub mod digest;
pub mod error;
pub mod event;
pub mod random;
pub mod transport;

// 重新导出常用类型
pub use client::{connect, Client, ConnectOptions, Reply, ReplyType};
pub use codec::{decode_message, encode_message, encode_option, Message, Options};
pub use connection::{Connection, ConnectionState, ConnectionStatus};
pub use error::{CallError, CodecError, ConnectionError, TransportError};
pub use event::{CloseInfo, ConnectionEvent};
