/// 随机源
///
/// 连接 ID 与调用令牌都从这里取，测试中可替换为固定序列

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::Rng;

pub trait RandomSource: Send + Sync {
    /// 随机连接 ID
    fn next_u32(&self) -> u32;

    /// 调用令牌（小写十六进制）
    fn token(&self) -> String {
        let high = u64::from(self.next_u32());
        let low = u64::from(self.next_u32());
        format!("{:x}", (high << 32) | low)
    }
}

/// 线程本地随机数
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_u32(&self) -> u32 {
        rand::thread_rng().gen()
    }

    fn token(&self) -> String {
        format!("{:x}", rand::thread_rng().gen::<u64>())
    }
}

/// 按顺序返回预设的 ID 和令牌
///
/// 预设值用完后退化为递增计数：ID 为 `1, 2, ...`，令牌为 `token-1, token-2, ...`
#[derive(Debug, Default)]
pub struct SequenceRandom {
    ids: Mutex<VecDeque<u32>>,
    tokens: Mutex<VecDeque<String>>,
    counter: AtomicU32,
}

impl SequenceRandom {
    pub fn new<I, T>(ids: I, tokens: T) -> Self
    where
        I: IntoIterator<Item = u32>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            ids: Mutex::new(ids.into_iter().collect()),
            tokens: Mutex::new(tokens.into_iter().map(Into::into).collect()),
            counter: AtomicU32::new(0),
        }
    }

    fn tick(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl RandomSource for SequenceRandom {
    fn next_u32(&self) -> u32 {
        let next = self
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| self.tick())
    }

    fn token(&self) -> String {
        let next = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| format!("token-{}", self.tick()))
    }
}
