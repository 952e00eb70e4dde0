/// 消息编解码
///
/// 线格式（所有整数均为大端）：
///
/// ```text
/// message = [count: u8] option{count} [payload_len: u16] payload
/// option  = [key_len: u8] key [value_len: u16] value
/// ```

pub mod message;
pub mod option;

pub use message::{decode_message, encode_message, Message, Options};
pub use option::{encode_option, encode_option_into, MAX_KEY_LEN, MAX_VALUE_LEN};

use crate::error::CodecError;

/// 协议保留的选项键
pub mod keys {
    /// 调用的路由（命令名）
    pub const ROUTE: &str = "route";

    /// 请求/响应关联令牌
    pub const TOKEN: &str = "token";

    /// 与 `token` 相同，供宿主 IPC 层使用
    pub const IPC_TOKEN: &str = "ipc-token";

    /// 分块内容摘要，同时作为确认键
    pub const DIGEST: &str = "digest";

    /// 仅在本地决定结果的解释方式，不会发送
    pub const TYPE: &str = "type";
}

/// 带边界检查的读游标
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub(crate) fn read_u8(&mut self, what: &str) -> Result<u8, CodecError> {
        let bytes = self.read_bytes(1, what)?;
        Ok(bytes[0])
    }

    pub(crate) fn read_u16(&mut self, what: &str) -> Result<u16, CodecError> {
        let bytes = self.read_bytes(2, what)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8], CodecError> {
        if len > self.remaining() {
            return Err(CodecError::malformed(
                self.offset,
                format!(
                    "{} 需要 {} 字节，剩余 {} 字节",
                    what,
                    len,
                    self.remaining()
                ),
            ));
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub(crate) fn read_str(&mut self, len: usize, what: &str) -> Result<String, CodecError> {
        let start = self.offset;
        let bytes = self.read_bytes(len, what)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| CodecError::malformed(start, format!("{} 不是合法的 UTF-8: {}", what, e)))
    }
}
