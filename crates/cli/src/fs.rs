/// 远程文件系统
///
/// 对 `fs.open` / `fs.stat` / `fs.read` / `fs.close` 四个远程命令的薄封装

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use tracing::debug;

use conduit::{CallError, Client, Options, Reply};

/// `fs.open` 的默认 mode
const DEFAULT_MODE: u32 = 4;
/// `fs.open` 的默认 flags（只读）
const DEFAULT_FLAGS: u32 = 0;

/// 远端打开的文件
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileHandle {
    #[serde(deserialize_with = "lenient")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub fd: i64,
}

/// 时间戳，只关心秒
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TimeSpec {
    #[serde(default, deserialize_with = "lenient")]
    pub tv_sec: i64,
}

impl TimeSpec {
    pub fn as_millis(&self) -> i64 {
        self.tv_sec * 1000
    }
}

/// `fs.stat` 结果，数值字段可能以字符串形式出现
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Stat {
    #[serde(rename = "st_dev", deserialize_with = "lenient")]
    pub dev: u64,
    #[serde(rename = "st_mode", deserialize_with = "lenient")]
    pub mode: u32,
    #[serde(rename = "st_nlink", deserialize_with = "lenient")]
    pub nlink: u64,
    #[serde(rename = "st_uid", deserialize_with = "lenient")]
    pub uid: u32,
    #[serde(rename = "st_gid", deserialize_with = "lenient")]
    pub gid: u32,
    #[serde(rename = "st_rdev", deserialize_with = "lenient")]
    pub rdev: u64,
    #[serde(rename = "st_blksize", deserialize_with = "lenient")]
    pub blksize: u64,
    #[serde(rename = "st_ino", deserialize_with = "lenient")]
    pub ino: u64,
    #[serde(rename = "st_size", deserialize_with = "lenient")]
    pub size: u64,
    #[serde(rename = "st_blocks", deserialize_with = "lenient")]
    pub blocks: u64,
    #[serde(rename = "st_atim")]
    pub atime: TimeSpec,
    #[serde(rename = "st_mtim")]
    pub mtime: TimeSpec,
    #[serde(rename = "st_ctim")]
    pub ctime: TimeSpec,
    #[serde(rename = "st_birthtim")]
    pub birthtime: TimeSpec,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(serde_json::Number),
    Text(String),
}

/// 接受数字或数字字符串，`null` 视为默认值
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: fmt::Display,
{
    let text = match Option::<Loose>::deserialize(deserializer)? {
        None => return Ok(T::default()),
        Some(Loose::Number(number)) => number.to_string(),
        Some(Loose::Text(text)) => text,
    };
    text.trim().parse().map_err(serde::de::Error::custom)
}

/// 远程文件系统
pub struct RemoteFs<'a> {
    client: &'a Client,
}

impl<'a> RemoteFs<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// 以默认 mode / flags 打开文件
    pub async fn open(&self, path: &str) -> Result<FileHandle, CallError> {
        self.open_with(path, DEFAULT_MODE, DEFAULT_FLAGS).await
    }

    pub async fn open_with(
        &self,
        path: &str,
        mode: u32,
        flags: u32,
    ) -> Result<FileHandle, CallError> {
        let options = Options::new()
            .with("path", path)
            .with("mode", mode)
            .with("flags", flags);
        self.client
            .call("fs.open", options, None)
            .await?
            .deserialize()
    }

    pub async fn stat(&self, path: &str) -> Result<Stat, CallError> {
        self.client
            .call("fs.stat", Options::new().with("path", path), None)
            .await?
            .deserialize()
    }

    /// 读取原始字节
    pub async fn read(
        &self,
        handle: &FileHandle,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, CallError> {
        let options = Options::new()
            .with("id", &handle.id)
            .with("offset", offset)
            .with("size", size)
            .with("type", "arraybuffer");
        let reply = self.client.call("fs.read", options, None).await?;
        Ok(reply.into_bytes())
    }

    pub async fn close(&self, handle: &FileHandle) -> Result<Reply, CallError> {
        self.client
            .call("fs.close", Options::new().with("id", &handle.id), None)
            .await
    }

    /// 打开、按 stat 大小读取整个文件、关闭
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, CallError> {
        let handle = self.open(path).await?;
        let stat = self.stat(path).await?;
        debug!("读取远程文件: path={}, id={}, size={}", path, handle.id, stat.size);

        let data = self.read(&handle, 0, stat.size).await;
        let closed = self.close(&handle).await;
        let data = data?;
        closed?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use conduit::random::SequenceRandom;
    use conduit::transport::memory::{MemoryPeer, MemoryTransportFactory};
    use conduit::{ConnectOptions, Message};
    use serde_json::json;

    async fn connect(tokens: &[&str]) -> (Client, MemoryPeer) {
        let (factory, mut listener) = MemoryTransportFactory::new();
        let random = SequenceRandom::new([1], tokens.iter().copied());
        let options = ConnectOptions::new("ws://localhost:8080", "hello world")
            .with_random(Arc::new(random))
            .with_transport(Arc::new(factory));

        let connecting = tokio::spawn(conduit::connect(options));
        let peer = listener.accept().await.unwrap();
        peer.open().unwrap();
        (connecting.await.unwrap().unwrap(), peer)
    }

    fn reply(token: &str, payload: &[u8]) -> Message {
        Message::new(Options::new().with("token", token), payload.to_vec())
    }

    #[test]
    fn test_stat_accepts_strings() {
        let stat: Stat = serde_json::from_value(json!({
            "st_size": "1234",
            "st_mode": 33188,
            "st_uid": " 1000 ",
            "st_ino": null,
            "st_mtim": {"tv_sec": "1700000000", "tv_nsec": "5"}
        }))
        .unwrap();
        assert_eq!(stat.size, 1234);
        assert_eq!(stat.mode, 33188);
        assert_eq!(stat.uid, 1000);
        assert_eq!(stat.ino, 0);
        assert_eq!(stat.mtime.as_millis(), 1_700_000_000_000);
        assert_eq!(stat.atime, TimeSpec::default());
    }

    #[test]
    fn test_stat_rejects_garbage() {
        let result: Result<Stat, _> = serde_json::from_value(json!({"st_size": "big"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_file_handle_numeric_id() {
        let handle: FileHandle = serde_json::from_value(json!({"id": 9, "fd": "3"})).unwrap();
        assert_eq!(handle.id, "9");
        assert_eq!(handle.fd, 3);
    }

    #[tokio::test]
    async fn test_read_file() {
        let (client, mut peer) = connect(&["t1", "t2", "t3", "t4"]).await;

        let task = tokio::spawn(async move {
            let data = RemoteFs::new(&client).read_file("index.html").await;
            client.close().await;
            data
        });

        let open = peer.recv().await.unwrap();
        assert_eq!(open.option("route"), Some("fs.open"));
        assert_eq!(open.option("path"), Some("index.html"));
        assert_eq!(open.option("mode"), Some("4"));
        assert_eq!(open.option("flags"), Some("0"));
        peer.send(&reply("t1", br#"{"data":{"id":"f1","fd":3}}"#)).unwrap();

        let stat = peer.recv().await.unwrap();
        assert_eq!(stat.option("route"), Some("fs.stat"));
        peer.send(&reply("t2", br#"{"data":{"st_size":"5"}}"#)).unwrap();

        let read = peer.recv().await.unwrap();
        assert_eq!(read.option("route"), Some("fs.read"));
        assert_eq!(read.option("id"), Some("f1"));
        assert_eq!(read.option("offset"), Some("0"));
        assert_eq!(read.option("size"), Some("5"));
        assert_eq!(read.option("type"), None);
        peer.send(&reply("t3", b"hello")).unwrap();

        let close = peer.recv().await.unwrap();
        assert_eq!(close.option("route"), Some("fs.close"));
        assert_eq!(close.option("id"), Some("f1"));
        peer.send(&reply("t4", br#"{"data":null}"#)).unwrap();

        assert!(peer.recv().await.is_none());
        peer.close(1000, "").unwrap();

        assert_eq!(task.await.unwrap().unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_open_error() {
        let (client, mut peer) = connect(&["t1"]).await;

        let task = tokio::spawn(async move { RemoteFs::new(&client).open("missing").await });

        peer.recv().await.unwrap();
        peer.send(&reply("t1", br#"{"err":{"message":"ENOENT"}}"#))
            .unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "ENOENT");
    }
}
