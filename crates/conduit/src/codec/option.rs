/// 单个选项的编解码
///
/// `[key_len: u8][key][value_len: u16 BE][value]`

use super::Reader;
use crate::error::CodecError;

/// 键的最大字节数
pub const MAX_KEY_LEN: usize = u8::MAX as usize;

/// 值的最大字节数
pub const MAX_VALUE_LEN: usize = u16::MAX as usize;

/// 编码后的字节数
pub fn encoded_len(key: &str, value: &str) -> usize {
    1 + key.len() + 2 + value.len()
}

/// 编码一个选项
pub fn encode_option(key: &str, value: &str) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(encoded_len(key, value));
    encode_option_into(&mut buf, key, value)?;
    Ok(buf)
}

/// 将一个选项追加到已有缓冲区
///
/// 超出长度限制时返回错误，缓冲区保持不变
pub fn encode_option_into(buf: &mut Vec<u8>, key: &str, value: &str) -> Result<(), CodecError> {
    let key_len = u8::try_from(key.len()).map_err(|_| CodecError::KeyTooLong { len: key.len() })?;
    let value_len = u16::try_from(value.len()).map_err(|_| CodecError::ValueTooLong {
        key: key.to_string(),
        len: value.len(),
    })?;

    buf.push(key_len);
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(&value_len.to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

pub(crate) fn decode_option(reader: &mut Reader<'_>) -> Result<(String, String), CodecError> {
    let key_len = reader.read_u8("key length")?;
    let key = reader.read_str(key_len as usize, "key")?;
    let value_len = reader.read_u16("value length")?;
    let value = reader.read_str(value_len as usize, "value")?;
    Ok((key, value))
}
