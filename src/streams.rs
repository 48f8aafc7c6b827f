//! 游標掃描與列表彈出的惰性串流
//!
//! 串流在第一次 poll 之前不會送出任何命令；消費端丟棄串流（或使用
//! `take` 之類的組合子）即停止迭代。

use futures::stream::{self, BoxStream, StreamExt};
use redis::aio::ConnectionLike;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::commands::{self, NameAndValue};
use crate::config::types::RedisConfig;
use crate::error::{RedisxError, Result};

/// 每次 SCAN 的預設 COUNT 提示
pub const DEFAULT_SCAN_COUNT: usize = 1000;

/// 掃描選項
#[derive(Debug, Clone)]
pub struct ScanOpts {
    /// MATCH 模式，空字串表示不過濾
    pub pattern: String,
    /// 每次 SCAN 的 COUNT 提示
    pub count: usize,
}

impl Default for ScanOpts {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            count: DEFAULT_SCAN_COUNT,
        }
    }
}

impl ScanOpts {
    pub fn matching(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    /// 不過濾模式，COUNT 取自 `redis.scan_count`
    pub fn from_config(config: &RedisConfig) -> Self {
        Self::default().with_count(config.scan_count)
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

/// 阻塞彈出選項
///
/// `timeout` 是每次 BLPOP 的阻塞時間（零表示無限期）；
/// `deadline` 到期後串流返回 `DeadlineExceeded` 並結束。
#[derive(Debug, Clone, Copy)]
pub struct BlpopOpts {
    pub timeout: Duration,
    pub deadline: Option<Instant>,
}

impl BlpopOpts {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// 本次 BLPOP 的阻塞時間，截止時間已過時返回 `None`
    fn next_wait(&self, now: Instant) -> Option<Duration> {
        let Some(deadline) = self.deadline else {
            return Some(self.timeout);
        };

        let remaining = deadline.saturating_duration_since(now);
        if remaining.is_zero() {
            return None;
        }

        // BLPOP 的精度為毫秒
        let remaining = remaining.max(Duration::from_millis(1));
        if self.timeout.is_zero() {
            Some(remaining)
        } else {
            Some(self.timeout.min(remaining))
        }
    }
}

struct ScanState<C> {
    conn: C,
    opts: ScanOpts,
    cursor: u64,
    buffered: VecDeque<String>,
    done: bool,
}

/// 以 SCAN 逐一產生符合條件的鍵，伺服器返回游標 0 的那一批之後結束
///
/// 錯誤只產生一次，之後串流結束。
pub fn scan_values<C>(conn: C, opts: ScanOpts) -> BoxStream<'static, Result<String>>
where
    C: ConnectionLike + Send + Sync + 'static,
{
    let state = ScanState {
        conn,
        opts,
        cursor: 0,
        buffered: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(key) = state.buffered.pop_front() {
                return Some((Ok(key), state));
            }
            if state.done {
                return None;
            }

            let result = commands::scan(
                &mut state.conn,
                state.cursor,
                &state.opts.pattern,
                state.opts.count,
            )
            .await;

            match result {
                Ok((keys, next)) => {
                    state.buffered.extend(keys);
                    state.cursor = next;
                    state.done = next == 0;
                }
                Err(err) => {
                    state.done = true;
                    return Some((Err(err), state));
                }
            }
        }
    })
    .boxed()
}

struct BlpopState<C> {
    conn: C,
    opts: BlpopOpts,
    keys: Vec<String>,
    done: bool,
}

/// 重複 BLPOP 並產生（列表鍵, 元素）
///
/// 超時而未取消時靜默重試；截止時間已過則產生 `DeadlineExceeded` 後結束，
/// 其他錯誤產生一次後結束。
pub fn blpop_values<C>(
    conn: C,
    opts: BlpopOpts,
    keys: Vec<String>,
) -> BoxStream<'static, Result<NameAndValue<String, String>>>
where
    C: ConnectionLike + Send + Sync + 'static,
{
    let state = BlpopState {
        conn,
        opts,
        keys,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        loop {
            let Some(wait) = state.opts.next_wait(Instant::now()) else {
                state.done = true;
                return Some((Err(RedisxError::DeadlineExceeded), state));
            };

            let result = commands::blpop(&mut state.conn, wait, state.keys.as_slice()).await;
            match result {
                Ok(item) => return Some((Ok(item), state)),
                Err(RedisxError::NoValue) => {
                    debug!("blpop timeout, retry: keys={:?}", state.keys);
                }
                Err(err) => {
                    state.done = true;
                    return Some((Err(err), state));
                }
            }
        }
    })
    .boxed()
}

/// 重複 LPOP 直到列表為空
///
/// 列表取空是正常結束，不會產生 `NoValue`；其他錯誤產生一次後結束。
pub fn lpop_values<C>(conn: C, key: String) -> BoxStream<'static, Result<String>>
where
    C: ConnectionLike + Send + Sync + 'static,
{
    stream::unfold(Some((conn, key)), |state| async move {
        let Some((mut conn, key)) = state else {
            return None;
        };

        let result = commands::lpop(&mut conn, &key).await;
        match result {
            Ok(value) => Some((Ok(value), Some((conn, key)))),
            Err(RedisxError::NoValue) => None,
            Err(err) => Some((Err(err), None)),
        }
    })
    .boxed()
}
