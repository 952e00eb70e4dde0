/// WebSocket 传输
///
/// 基于 tokio-tungstenite：后台任务负责握手、读帧并把帧转成传输事件，
/// 发送经由无界通道交给同一任务写出

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, warn};

use super::{Transport, TransportData, TransportEvent, TransportEvents, TransportFactory};
use crate::error::TransportError;
use crate::event::CloseInfo;

/// 收到不带状态码的关闭帧
const NO_STATUS_RECEIVED: u16 = 1005;

/// 发送任务的指令
enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// WebSocket 传输工厂
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    fn open(&self, url: &str) -> Result<(Box<dyn Transport>, TransportEvents), TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TransportError::Io("需要在 tokio 运行时中打开 WebSocket".to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        runtime.spawn(run_socket(url.to_string(), outbound_rx, event_tx));

        Ok((Box::new(WsTransport { outbound: outbound_tx }), event_rx))
    }
}

/// WebSocket 传输句柄
struct WsTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Transport for WsTransport {
    fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Frame(bytes))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

async fn run_socket(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            error!("WebSocket 连接失败: url={}, error={}", url, e);
            let _ = events.send(TransportEvent::Error(e.to_string()));
            let _ = events.send(TransportEvent::Close(CloseInfo::abnormal()));
            return;
        }
    };

    info!("✅ WebSocket 连接成功: {}", url);
    let _ = events.send(TransportEvent::Open);

    let (mut ws_sender, mut ws_receiver) = stream.split();
    let mut close_frame: Option<CloseInfo> = None;
    let mut closing = false;

    loop {
        tokio::select! {
            command = outbound.recv(), if !closing => match command {
                Some(Outbound::Frame(bytes)) => {
                    if let Err(e) = ws_sender.send(WsMessage::Binary(bytes)).await {
                        error!("发送消息失败: {}", e);
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                // 句柄被丢弃时同样发起关闭握手
                Some(Outbound::Close) | None => {
                    closing = true;
                    debug!("发起关闭握手");
                    if let Err(e) = ws_sender.send(WsMessage::Close(None)).await {
                        warn!("发送关闭帧失败: {}", e);
                        break;
                    }
                }
            },
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(WsMessage::Binary(data))) => {
                    let _ = events.send(TransportEvent::Message(TransportData::Binary(data)));
                }
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(TransportData::Text(text)));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!("收到关闭帧: {:?}", frame);
                    close_frame = Some(match frame {
                        Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.into_owned(), true),
                        None => CloseInfo::new(NO_STATUS_RECEIVED, "", true),
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) | None => break,
                Some(Err(e)) => {
                    error!("接收消息错误: {}", e);
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    }

    let info = close_frame.unwrap_or_else(CloseInfo::abnormal);
    debug!("WebSocket 任务结束: code={}, clean={}", info.code, info.was_clean);
    let _ = events.send(TransportEvent::Close(info));
}
