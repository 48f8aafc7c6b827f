use redis::RedisError;
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

use crate::config::ValidationError;

/// 輔助函數的錯誤類型
///
/// `NotFound` 與 `NoValue` 是哨兵值，表示「沒有資料」而非失敗，
/// 不會被附加上下文；其餘命令失敗都包裝成 `Command`。
#[derive(Error, Debug)]
pub enum RedisxError {
    /// 鍵或雜湊欄位不存在
    #[error("not found")]
    NotFound,

    /// 列表操作沒有取得任何值（包括 BLPOP 超時）
    #[error("no value")]
    NoValue,

    /// 命令執行失敗
    #[error("{context}: {source}")]
    Command {
        context: String,
        source: RedisError,
    },

    /// 連接超時
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// 串流的截止時間已過
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// 連接配置無效
    #[error("invalid redis config: {0}")]
    Config(#[from] ValidationError),
}

/// 結果類型別名
pub type Result<T> = std::result::Result<T, RedisxError>;

impl RedisxError {
    pub(crate) fn command(context: impl Into<String>, source: RedisError) -> Self {
        RedisxError::Command {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RedisxError::NotFound)
    }

    pub fn is_no_value(&self) -> bool {
        matches!(self, RedisxError::NoValue)
    }
}

/// 檢查錯誤鏈中是否含有 `NotFound`
///
/// 呼叫端再包裝一層（例如 `anyhow::Context`）後仍能辨識。
pub fn is_not_found(err: &(dyn StdError + 'static)) -> bool {
    find_in_chain(err, RedisxError::is_not_found)
}

/// 檢查錯誤鏈中是否含有 `NoValue`
pub fn is_no_value(err: &(dyn StdError + 'static)) -> bool {
    find_in_chain(err, RedisxError::is_no_value)
}

fn find_in_chain(err: &(dyn StdError + 'static), pred: fn(&RedisxError) -> bool) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<RedisxError>().is_some_and(pred) {
            return true;
        }
        current = e.source();
    }
    false
}
