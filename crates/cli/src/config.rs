/// 配置管理

use std::time::Duration;

use anyhow::Context;
use conduit::ConnectOptions;

/// 默认每次等待的超时（秒）
const DEFAULT_CALL_TIMEOUT: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub origin: String,
    pub key: String,
    /// 连接 ID，缺省时随机生成
    pub id: Option<u32>,
    /// `None` 表示不限时
    pub call_timeout: Option<Duration>,
    pub log_level: String,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let origin = lookup("CONDUIT_ORIGIN").unwrap_or_else(|| "ws://localhost:8080".to_string());

        let key = lookup("CONDUIT_KEY").unwrap_or_else(|| "hello world".to_string());

        let id = lookup("CONDUIT_ID")
            .map(|id| id.parse::<u32>())
            .transpose()
            .context("CONDUIT_ID 必须是 u32")?;

        let call_timeout = lookup("CALL_TIMEOUT")
            .unwrap_or_else(|| DEFAULT_CALL_TIMEOUT.to_string())
            .parse::<u64>()
            .context("CALL_TIMEOUT 必须是秒数")?;
        let call_timeout = (call_timeout > 0).then(|| Duration::from_secs(call_timeout));

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            origin,
            key,
            id,
            call_timeout,
            log_level,
        })
    }

    pub fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new(&self.origin, &self.key);
        if let Some(id) = self.id {
            options = options.with_id(id);
        }
        if let Some(timeout) = self.call_timeout {
            options = options.with_call_timeout(timeout);
        }
        options
    }
}
