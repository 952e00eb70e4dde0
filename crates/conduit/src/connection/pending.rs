/// 关联表
///
/// 令牌 -> 等待响应的调用，摘要 -> 等待确认的分块。
/// 同一个键允许多个等待者，按注册顺序依次满足。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use crate::codec::Message;
use crate::error::CallError;

/// 等待者的关联方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Correlation {
    /// 按 `token` 选项匹配
    Reply,
    /// 按 `digest` 选项匹配
    Ack,
}

type Slot = (u64, oneshot::Sender<Message>);

#[derive(Debug, Default)]
struct Table {
    replies: HashMap<String, VecDeque<Slot>>,
    acks: HashMap<String, VecDeque<Slot>>,
    next_id: u64,
    closed: bool,
}

impl Table {
    fn map(&mut self, kind: Correlation) -> &mut HashMap<String, VecDeque<Slot>> {
        match kind {
            Correlation::Reply => &mut self.replies,
            Correlation::Ack => &mut self.acks,
        }
    }

    /// 取出一个仍在等待的发送端
    fn take(&mut self, kind: Correlation, key: &str) -> Option<oneshot::Sender<Message>> {
        let map = self.map(kind);
        let queue = map.get_mut(key)?;
        let mut found = None;
        while let Some((_, sender)) = queue.pop_front() {
            if !sender.is_closed() {
                found = Some(sender);
                break;
            }
        }
        if queue.is_empty() {
            map.remove(key);
        }
        found
    }

    fn remove(&mut self, kind: Correlation, key: &str, id: u64) {
        let map = self.map(kind);
        if let Some(queue) = map.get_mut(key) {
            queue.retain(|(slot_id, _)| *slot_id != id);
            if queue.is_empty() {
                map.remove(key);
            }
        }
    }
}

/// 连接内共享的关联表
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingTable {
    inner: Arc<Mutex<Table>>,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 注册等待者；连接已关闭时返回 `ConnectionClosed`
    pub(crate) fn register(&self, kind: Correlation, key: &str) -> Result<Waiter, CallError> {
        let (tx, rx) = oneshot::channel();
        let mut table = self.lock();
        if table.closed {
            return Err(CallError::ConnectionClosed);
        }
        table.next_id += 1;
        let id = table.next_id;
        table
            .map(kind)
            .entry(key.to_string())
            .or_default()
            .push_back((id, tx));

        Ok(Waiter {
            table: self.clone(),
            kind,
            key: key.to_string(),
            id,
            rx,
        })
    }

    /// 把入站消息交给匹配的等待者，先按令牌再按摘要
    pub(crate) fn resolve(&self, message: &Message) -> Option<Correlation> {
        let mut table = self.lock();

        if let Some(token) = message.token() {
            if let Some(sender) = table.take(Correlation::Reply, token) {
                let _ = sender.send(message.clone());
                return Some(Correlation::Reply);
            }
        }

        if let Some(digest) = message.digest() {
            if let Some(sender) = table.take(Correlation::Ack, digest) {
                let _ = sender.send(message.clone());
                return Some(Correlation::Ack);
            }
        }

        None
    }

    /// 连接关闭：丢弃所有等待者并拒绝后续注册
    pub(crate) fn close(&self) -> usize {
        let mut table = self.lock();
        table.closed = true;
        let dropped = table.replies.values().map(VecDeque::len).sum::<usize>()
            + table.acks.values().map(VecDeque::len).sum::<usize>();
        table.replies.clear();
        table.acks.clear();
        dropped
    }

    /// 当前等待中的调用数与分块数
    pub(crate) fn counts(&self) -> (usize, usize) {
        let table = self.lock();
        (
            table.replies.values().map(VecDeque::len).sum(),
            table.acks.values().map(VecDeque::len).sum(),
        )
    }
}

/// 单个等待者；被丢弃时自动从关联表中移除
#[derive(Debug)]
pub(crate) struct Waiter {
    table: PendingTable,
    kind: Correlation,
    key: String,
    id: u64,
    rx: oneshot::Receiver<Message>,
}

impl Waiter {
    /// 等待匹配的消息，可选超时
    pub(crate) async fn wait(mut self, timeout: Option<Duration>) -> Result<Message, CallError> {
        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(received) => received,
                Err(_) => {
                    debug!("等待超时: kind={:?}, key={}", self.kind, self.key);
                    return Err(CallError::Timeout {
                        key: self.key.clone(),
                    });
                }
            },
            None => (&mut self.rx).await,
        };
        received.map_err(|_| CallError::ConnectionClosed)
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.table.lock().remove(self.kind, &self.key, self.id);
    }
}
