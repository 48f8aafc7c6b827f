//! 單一命令的輔助函數
//!
//! 每個函數對任意 `redis::aio::ConnectionLike` 執行一個命令：
//! 空回覆轉換成哨兵錯誤（`NotFound` / `NoValue`），其他失敗記錄日誌後
//! 附上呼叫位置的上下文（鍵、操作）返回。
//! 因為只依賴 `ConnectionLike`，多工連接、連接管理器或連接池取得的連接都能使用。

use redis::aio::ConnectionLike;
use redis::{AsyncCommands, Cmd, RedisError, ToRedisArgs};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{RedisxError, Result};

/// 名稱與值的組合：BLPOP 的（列表鍵, 元素），或訂閱訊息的（頻道, 內容）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAndValue<N, V> {
    pub name: N,
    pub value: V,
}

pub(crate) fn failed(context: String, source: RedisError) -> RedisxError {
    error!("{}: {}", context, source);
    RedisxError::command(context, source)
}

/// 整數秒使用 EX，其餘以毫秒 PX 設置
fn push_expiration(cmd: &mut Cmd, expiration: Duration) {
    if expiration.subsec_nanos() == 0 {
        cmd.arg("EX").arg(clamp_to_i64(u128::from(expiration.as_secs())));
    } else {
        cmd.arg("PX").arg(clamp_to_i64(expiration.as_millis().max(1)));
    }
}

/// Redis 的過期與超時參數是有號 64 位元，超出範圍時取最大值而不是溢位成負數
fn clamp_to_i64(value: u128) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// BLPOP 的超時以毫秒計，非零但不足 1ms 的值會被伺服器當成 0（無限期）
fn blocking_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        timeout
    } else {
        timeout.max(Duration::from_millis(1))
    }
}

/// GET，鍵不存在時返回 `NotFound`
pub async fn get<C>(conn: &mut C, key: &str) -> Result<String>
where
    C: ConnectionLike + Send + Sync,
{
    match conn.get::<_, Option<String>>(key).await {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(RedisxError::NotFound),
        Err(err) => Err(failed(format!("get failed: key={}", key), err)),
    }
}

/// SET，可選的過期時間；`None` 或零表示不過期
pub async fn set<C, V>(
    conn: &mut C,
    key: &str,
    value: V,
    expiration: impl Into<Option<Duration>>,
) -> Result<()>
where
    C: ConnectionLike + Send + Sync,
    V: ToRedisArgs + fmt::Debug + Send + Sync,
{
    let expiration = expiration.into().filter(|exp| !exp.is_zero());
    debug!("set: key={}, value={:?}, expire={:?}", key, value, expiration);

    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(&value);
    if let Some(exp) = expiration {
        push_expiration(&mut cmd, exp);
    }

    cmd.query_async::<()>(conn)
        .await
        .map_err(|err| failed(format!("set failed: key={}, value={:?}", key, value), err))
}

/// DEL，返回實際刪除的鍵數
pub async fn del<C>(conn: &mut C, key: &str) -> Result<i64>
where
    C: ConnectionLike + Send + Sync,
{
    conn.del::<_, i64>(key)
        .await
        .map_err(|err| failed(format!("del failed: key={}", key), err))
}

pub async fn ping<C>(conn: &mut C) -> Result<String>
where
    C: ConnectionLike + Send + Sync,
{
    redis::cmd("PING")
        .query_async::<String>(conn)
        .await
        .map_err(|err| failed("ping failed".to_string(), err))
}

/// HGET，鍵或欄位不存在時返回 `NotFound`
pub async fn hget<C>(conn: &mut C, key: &str, field: &str) -> Result<String>
where
    C: ConnectionLike + Send + Sync,
{
    match conn.hget::<_, _, Option<String>>(key, field).await {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(RedisxError::NotFound),
        Err(err) => Err(failed(
            format!("hget failed: key={}, field={}", key, field),
            err,
        )),
    }
}

/// HGETALL，鍵不存在時返回空表
pub async fn hget_all<C>(conn: &mut C, key: &str) -> Result<HashMap<String, String>>
where
    C: ConnectionLike + Send + Sync,
{
    conn.hgetall::<_, HashMap<String, String>>(key)
        .await
        .map_err(|err| failed(format!("hgetall failed: key={}", key), err))
}

/// HSET key field value [field value ...]，返回新增的欄位數
pub async fn hset<C, F, V>(conn: &mut C, key: &str, items: &[(F, V)]) -> Result<i64>
where
    C: ConnectionLike + Send + Sync,
    F: ToRedisArgs + fmt::Debug + Send + Sync,
    V: ToRedisArgs + fmt::Debug + Send + Sync,
{
    redis::cmd("HSET")
        .arg(key)
        .arg(items)
        .query_async::<i64>(conn)
        .await
        .map_err(|err| failed(format!("hset failed: key={}, values={:?}", key, items), err))
}

/// HDEL，返回實際刪除的欄位數
pub async fn hdel<C>(conn: &mut C, key: &str, fields: &[&str]) -> Result<i64>
where
    C: ConnectionLike + Send + Sync,
{
    conn.hdel::<_, _, i64>(key, fields)
        .await
        .map_err(|err| failed(format!("hdel failed: key={}, fields={:?}", key, fields), err))
}

/// RPUSH，返回推入後的列表長度
pub async fn rpush<C, V>(conn: &mut C, key: &str, values: V) -> Result<i64>
where
    C: ConnectionLike + Send + Sync,
    V: ToRedisArgs + fmt::Debug + Send + Sync,
{
    conn.rpush::<_, _, i64>(key, &values)
        .await
        .map_err(|err| failed(format!("rpush failed: key={}, values={:?}", key, values), err))
}

/// LPOP，鍵不存在或列表為空時返回 `NoValue`
pub async fn lpop<C>(conn: &mut C, key: &str) -> Result<String>
where
    C: ConnectionLike + Send + Sync,
{
    match conn.lpop::<_, Option<String>>(key, None).await {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(RedisxError::NoValue),
        Err(err) => Err(failed(format!("lpop failed: key={}", key), err)),
    }
}

/// BLPOP，最多阻塞 `timeout`（零表示無限期），超時返回 `NoValue`
pub async fn blpop<C, K>(
    conn: &mut C,
    timeout: Duration,
    keys: &[K],
) -> Result<NameAndValue<String, String>>
where
    C: ConnectionLike + Send + Sync,
    K: ToRedisArgs + fmt::Debug + Send + Sync,
{
    let reply = redis::cmd("BLPOP")
        .arg(keys)
        .arg(blocking_timeout(timeout).as_secs_f64())
        .query_async::<Option<(String, String)>>(conn)
        .await
        .map_err(|err| failed(format!("blpop failed: keys={:?}", keys), err))?;

    match reply {
        Some((name, value)) => Ok(NameAndValue { name, value }),
        None => Err(RedisxError::NoValue),
    }
}

/// SCAN 一次，返回（鍵, 下一個游標）；游標為 0 表示迭代結束
///
/// 空的 `pattern` 省略 MATCH，`count` 為 0 時省略 COUNT。
pub async fn scan<C>(
    conn: &mut C,
    cursor: u64,
    pattern: &str,
    count: usize,
) -> Result<(Vec<String>, u64)>
where
    C: ConnectionLike + Send + Sync,
{
    let mut cmd = redis::cmd("SCAN");
    cmd.arg(cursor);
    if !pattern.is_empty() {
        cmd.arg("MATCH").arg(pattern);
    }
    if count > 0 {
        cmd.arg("COUNT").arg(count);
    }

    let (next, keys) = cmd
        .query_async::<(u64, Vec<String>)>(conn)
        .await
        .map_err(|err| {
            failed(
                format!("scan failed: match={}, cursor={}", pattern, cursor),
                err,
            )
        })?;

    Ok((keys, next))
}

/// PUBLISH，返回收到訊息的訂閱者數量
pub async fn publish<C, M>(conn: &mut C, channel: &str, message: M) -> Result<i64>
where
    C: ConnectionLike + Send + Sync,
    M: ToRedisArgs + fmt::Debug + Send + Sync,
{
    debug!("publish: channel={}, message={:?}", channel, message);

    conn.publish::<_, _, i64>(channel, &message)
        .await
        .map_err(|err| {
            failed(
                format!("publish failed: channel={}, message={:?}", channel, message),
                err,
            )
        })
}

/// TTL：鍵不存在返回 `NotFound`，沒有過期時間返回 `None`
pub async fn ttl<C>(conn: &mut C, key: &str) -> Result<Option<Duration>>
where
    C: ConnectionLike + Send + Sync,
{
    let secs = conn
        .ttl::<_, i64>(key)
        .await
        .map_err(|err| failed(format!("ttl failed: key={}", key), err))?;

    match secs {
        -2 => Err(RedisxError::NotFound),
        s if s < 0 => Ok(None),
        s => Ok(Some(Duration::from_secs(s as u64))),
    }
}

/// EXPIRE，以秒為單位；不足一秒的非零值進位為一秒
pub async fn expire<C>(conn: &mut C, key: &str, expiration: Duration) -> Result<bool>
where
    C: ConnectionLike + Send + Sync,
{
    let mut secs = expiration.as_secs();
    if secs == 0 && !expiration.is_zero() {
        warn!(
            "expire: key={}, expiration={:?} is below the 1s resolution, using 1s",
            key, expiration
        );
        secs = 1;
    }

    conn.expire::<_, bool>(key, clamp_to_i64(u128::from(secs)))
        .await
        .map_err(|err| {
            failed(
                format!("expire failed: key={}, expiration={:?}", key, expiration),
                err,
            )
        })
}
