//! WebSocket 传输端到端测试
//!
//! 在本地端口上用 tokio-tungstenite 起一个最小服务端：确认分块、回显调用、按需关闭

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use conduit::random::SequenceRandom;
use conduit::{
    connect, Client, ConnectOptions, ConnectionEvent, ConnectionState, Message, Options, Reply,
};

/// 启动服务端，返回监听地址和握手时收到的请求路径
async fn spawn_server() -> (String, Arc<Mutex<Option<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen_uri = Arc::new(Mutex::new(None));

    let uri_slot = seen_uri.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            *uri_slot.lock().unwrap() = Some(request.uri().to_string());
            Ok(response)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        serve(ws).await;
    });

    (format!("ws://{}", addr), seen_uri)
}

async fn serve(ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) {
    let (mut sink, mut stream) = ws.split();
    let mut uploaded = 0usize;

    while let Some(Ok(frame)) = stream.next().await {
        let bytes = match frame {
            WsMessage::Binary(bytes) => bytes,
            // 关闭帧由 tungstenite 自动回应
            _ => continue,
        };
        let request = Message::decode(&bytes).unwrap();

        if let Some(digest) = request.digest() {
            uploaded += request.payload.len();
            let ack = Message::new(Options::new().with("digest", digest), Vec::new());
            sink.send(WsMessage::Binary(ack.encode().unwrap()))
                .await
                .unwrap();
            continue;
        }

        let token = request.token().unwrap().to_string();
        match request.options.get("route") {
            Some("bye") => {
                let frame = CloseFrame {
                    code: CloseCode::from(4000),
                    reason: "done".into(),
                };
                sink.send(WsMessage::Close(Some(frame))).await.unwrap();
            }
            Some("text") => {
                // 以文本帧回复
                let reply = Message::new(
                    Options::new().with("token", &token),
                    br#"{"data":"via text"}"#.to_vec(),
                );
                let text = String::from_utf8(reply.encode().unwrap()).unwrap();
                sink.send(WsMessage::Text(text)).await.unwrap();
            }
            route => {
                let body = json!({
                    "data": {
                        "route": route,
                        "uploaded": uploaded,
                        "path": request.options.get("path"),
                    }
                });
                let reply = Message::new(
                    Options::new().with("token", &token),
                    body.to_string().into_bytes(),
                );
                sink.send(WsMessage::Binary(reply.encode().unwrap()))
                    .await
                    .unwrap();
            }
        }
    }
}

async fn connect_to(origin: &str) -> Client {
    let random = SequenceRandom::new([5], ["t1", "t2", "t3"]);
    let options = ConnectOptions::new(origin, "a b&c")
        .with_random(Arc::new(random))
        .with_call_timeout(Duration::from_secs(5));
    connect(options).await.unwrap()
}

#[tokio::test]
async fn test_call_over_websocket() {
    let (origin, seen_uri) = spawn_server().await;
    let client = connect_to(&origin).await;

    assert_eq!(client.connection().state(), ConnectionState::Opened);
    assert_eq!(
        seen_uri.lock().unwrap().as_deref(),
        Some("/5/0?key=a%20b&c")
    );

    let reply = client
        .call("fs.stat", Options::new().with("path", "/etc/hosts"), None)
        .await
        .unwrap();
    assert_eq!(
        reply,
        Reply::Json(json!({"route": "fs.stat", "uploaded": 0, "path": "/etc/hosts"}))
    );

    client.close().await;
    assert_eq!(client.connection().state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_upload_over_websocket() {
    let (origin, _) = spawn_server().await;
    let client = connect_to(&origin).await;

    let data = vec![7u8; 3000];
    let reply = client
        .call("fs.write", Options::new(), Some(data.as_slice()))
        .await
        .unwrap();
    assert_eq!(reply.as_json().unwrap()["uploaded"], json!(3000));

    client.close().await;
}

#[tokio::test]
async fn test_text_frame_reply() {
    let (origin, _) = spawn_server().await;
    let client = connect_to(&origin).await;

    let reply = client.call("text", Options::new(), None).await.unwrap();
    assert_eq!(reply, Reply::Json(json!("via text")));

    client.close().await;
}

#[tokio::test]
async fn test_server_close_is_reported() {
    let (origin, _) = spawn_server().await;
    let client = connect_to(&origin).await;
    let mut events = client.subscribe();

    let err = client.call("bye", Options::new(), None).await.unwrap_err();
    assert!(matches!(err, conduit::CallError::ConnectionClosed));

    let close = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let ConnectionEvent::Close(info) = events.recv().await.unwrap() {
                return info;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(close.code, 4000);
    assert_eq!(close.reason, "done");
    assert!(close.was_clean);
    assert_eq!(client.connection().state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_connect_refused() {
    // 绑定后立即释放，端口上没有监听者
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let options = ConnectOptions::new(format!("ws://{}", addr), "k").with_id(1);
    let err = connect(options).await.unwrap_err();
    assert!(matches!(err, conduit::ConnectionError::Transport { .. }));
}
