/// 调用结果

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CallError;

/// 期望的结果形态，由调用选项 `type` 决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyType {
    #[default]
    Json,
    ArrayBuffer,
}

impl ReplyType {
    pub fn from_option(value: Option<&str>) -> Self {
        match value {
            Some("arraybuffer") => Self::ArrayBuffer,
            _ => Self::Json,
        }
    }
}

/// 一次调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// 响应信封中的 `data`，没有 `data` 时为整个 JSON
    Json(Value),
    /// 原始负载（负载不是 JSON，或请求了 `arraybuffer`）
    Bytes(Vec<u8>),
}

impl Reply {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Json(_) => None,
            Self::Bytes(bytes) => Some(bytes),
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Bytes(_) => None,
        }
    }

    /// 原始字节；JSON 结果重新序列化
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Json(value) => value.to_string().into_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    /// 反序列化为具体类型
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, CallError> {
        match self {
            Self::Json(value) => Ok(serde_json::from_value(value)?),
            Self::Bytes(bytes) => Ok(serde_json::from_slice(&bytes)?),
        }
    }
}

/// 解释响应负载
///
/// 1. 不是 JSON：返回原始字节
/// 2. 带有真值 `err`：调用失败
/// 3. 请求了 `arraybuffer`：返回原始字节
/// 4. 否则返回 `data`，没有则返回整个对象
pub(crate) fn interpret(payload: Vec<u8>, reply_type: ReplyType) -> Result<Reply, CallError> {
    let value: Value = match serde_json::from_slice(&payload) {
        Ok(value) => value,
        Err(_) => return Ok(Reply::Bytes(payload)),
    };

    if let Some(err) = value.get("err").filter(|err| is_truthy(err)) {
        return Err(CallError::Remote(remote_message(err)));
    }

    if reply_type == ReplyType::ArrayBuffer {
        return Ok(Reply::Bytes(payload));
    }

    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) if !data.is_null() => Ok(Reply::Json(data)),
            Some(data) => {
                map.insert("data".to_string(), data);
                Ok(Reply::Json(Value::Object(map)))
            }
            None => Ok(Reply::Json(Value::Object(map))),
        },
        other => Ok(Reply::Json(other)),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn remote_message(err: &Value) -> String {
    let message = match err.get("message") {
        Some(message) if !message.is_null() => message,
        _ => err,
    };
    match message {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
