/// 消息定义与编解码

use std::fmt;

use tracing::debug;

use super::option::{decode_option, encode_option_into, encoded_len};
use super::{keys, Reader};
use crate::error::CodecError;

/// 单条消息允许的最大选项数
pub const MAX_OPTIONS: usize = u8::MAX as usize;

/// 单条消息允许的最大负载字节数
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// 有序的选项集合
///
/// 保持插入顺序；对已存在的键再次插入时原位替换值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    entries: Vec<(String, String)>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式插入，值按 `Display` 转为字符串
    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.insert(key, value);
        self
    }

    /// 插入选项，返回被替换的旧值
    pub fn insert(&mut self, key: impl Into<String>, value: impl fmt::Display) -> Option<String> {
        let key = key.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<K: Into<String>, V: fmt::Display> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Options::new();
        options.extend(iter);
        options
    }
}

impl<K: Into<String>, V: fmt::Display> Extend<(K, V)> for Options {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl IntoIterator for Options {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// 一条完整消息：选项 + 不透明负载
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub options: Options,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(options: Options, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            options,
            payload: payload.into(),
        }
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key)
    }

    /// 关联令牌
    pub fn token(&self) -> Option<&str> {
        self.option(keys::TOKEN)
    }

    /// 分块摘要
    pub fn digest(&self) -> Option<&str> {
        self.option(keys::DIGEST)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode_message(&self.options, &self.payload)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        decode_message(data)
    }
}

/// 编码消息
pub fn encode_message(options: &Options, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let count = u8::try_from(options.len()).map_err(|_| CodecError::TooManyOptions {
        count: options.len(),
    })?;
    let payload_len = u16::try_from(payload.len()).map_err(|_| CodecError::PayloadTooLarge {
        len: payload.len(),
    })?;

    let options_len: usize = options.iter().map(|(k, v)| encoded_len(k, v)).sum();
    let mut buf = Vec::with_capacity(1 + options_len + 2 + payload.len());

    buf.push(count);
    for (key, value) in options.iter() {
        encode_option_into(&mut buf, key, value)?;
    }
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(payload);

    Ok(buf)
}

/// 解码消息
///
/// 重复的键以后出现的为准；负载之后多余的字节被忽略
pub fn decode_message(data: &[u8]) -> Result<Message, CodecError> {
    let mut reader = Reader::new(data);
    let count = reader.read_u8("option count")?;

    let mut options = Options::new();
    for _ in 0..count {
        let (key, value) = decode_option(&mut reader)?;
        options.insert(key, value);
    }

    let payload_len = reader.read_u16("payload length")?;
    let payload = reader.read_bytes(payload_len as usize, "payload")?.to_vec();

    if reader.remaining() > 0 {
        debug!(
            "消息末尾有 {} 字节多余数据 (offset={})",
            reader.remaining(),
            reader.offset()
        );
    }

    Ok(Message { options, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_options() -> Options {
        Options::new()
            .with("route", "fs.read")
            .with("offset", 0)
            .with("size", 1024u64)
            .with("recursive", true)
            .with("name", "文件.txt")
    }

    #[test]
    fn test_round_trip() {
        let options = sample_options();
        let payload = b"hello world".to_vec();

        let bytes = encode_message(&options, &payload).unwrap();
        let decoded = decode_message(&bytes).unwrap();

        assert_eq!(decoded.options, options);
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.option("offset"), Some("0"));
        assert_eq!(decoded.option("size"), Some("1024"));
        assert_eq!(decoded.option("recursive"), Some("true"));
    }

    #[test]
    fn test_options_preserve_insertion_order() {
        let mut options = Options::new().with("b", 1).with("a", 2).with("c", 3);
        assert_eq!(options.insert("a", 20), Some("2".to_string()));
        let keys: Vec<&str> = options.keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(options.get("a"), Some("20"));
        assert_eq!(options.remove("b"), Some("1".to_string()));
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn test_empty_message() {
        let bytes = encode_message(&Options::new(), &[]).unwrap();
        assert_eq!(bytes, vec![0, 0, 0]);

        let decoded = decode_message(&bytes).unwrap();
        assert!(decoded.options.is_empty());
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_wire_layout() {
        let options = Options::new().with("token", "ab");
        let bytes = encode_message(&options, &[0xde, 0xad]).unwrap();
        assert_eq!(
            bytes,
            vec![1, 5, b't', b'o', b'k', b'e', b'n', 0, 2, b'a', b'b', 0, 2, 0xde, 0xad]
        );
    }

    #[test]
    fn test_duplicate_keys_last_write_wins() {
        // 手工构造两条同名记录
        let mut bytes = vec![2];
        encode_option_into(&mut bytes, "token", "first").unwrap();
        encode_option_into(&mut bytes, "token", "second").unwrap();
        bytes.extend_from_slice(&[0, 0]);

        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(decoded.options.len(), 1);
        assert_eq!(decoded.token(), Some("second"));
    }

    #[test]
    fn test_payload_limit() {
        let payload = vec![7u8; MAX_PAYLOAD_LEN];
        let bytes = encode_message(&Options::new(), &payload).unwrap();
        assert_eq!(decode_message(&bytes).unwrap().payload.len(), MAX_PAYLOAD_LEN);

        let err = encode_message(&Options::new(), &vec![0u8; MAX_PAYLOAD_LEN + 1]).unwrap_err();
        assert_eq!(err, CodecError::PayloadTooLarge { len: 65_536 });
    }

    #[test]
    fn test_too_many_options() {
        let options: Options = (0..256).map(|i| (format!("k{}", i), i)).collect();
        let err = encode_message(&options, &[]).unwrap_err();
        assert_eq!(err, CodecError::TooManyOptions { count: 256 });

        let options: Options = (0..255).map(|i| (format!("k{}", i), i)).collect();
        let decoded = decode_message(&encode_message(&options, &[]).unwrap()).unwrap();
        assert_eq!(decoded.options.len(), 255);
    }

    #[test]
    fn test_malformed_inputs() {
        // 空输入
        assert!(decode_message(&[]).unwrap_err().is_malformed());

        // 声明 1 个选项但没有数据
        assert!(decode_message(&[1]).unwrap_err().is_malformed());

        // 键长度超出剩余字节
        assert!(decode_message(&[1, 9, b'a']).unwrap_err().is_malformed());

        // 缺少负载长度
        assert!(decode_message(&[0, 0]).unwrap_err().is_malformed());

        // 声明负载 5 字节，实际只有 3 字节
        let err = decode_message(&[0, 0, 5, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { offset: 3, .. }));
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let mut bytes = encode_message(&Options::new().with("a", "b"), b"xy").unwrap();
        bytes.extend_from_slice(b"junk");
        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(decoded.payload, b"xy".to_vec());
    }
}
