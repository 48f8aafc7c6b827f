use futures::stream::{self, BoxStream, StreamExt};
use redis::aio::MultiplexedConnection;
use redis::{Client as RedisClient, Msg, ToRedisArgs};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::commands::{self, failed, NameAndValue};
use crate::error::Result;
use crate::streams::{self, BlpopOpts, ScanOpts, DEFAULT_SCAN_COUNT};

/// Redis客戶端
///
/// 包裝 `redis::Client` 與一條多工連接。clone 的成本很低，
/// 所有 clone 共享同一條連接，可在多個任務中並行使用。
/// BLPOP 會佔住所在的連接，因此阻塞彈出另開專用連接。
#[derive(Clone)]
pub struct Client {
    inner: RedisClient,
    conn: MultiplexedConnection,
    scan_count: usize,
}

/// 開一條新的多工連接
async fn open_connection(inner: &RedisClient) -> Result<MultiplexedConnection> {
    inner.get_multiplexed_async_connection().await.map_err(|err| {
        failed(
            format!("connect failed: addr={}", inner.get_connection_info().addr),
            err,
        )
    })
}

impl Client {
    /// 以既有的 `redis::Client` 建立多工連接
    pub async fn new(inner: RedisClient) -> Result<Self> {
        let conn = open_connection(&inner).await?;
        Ok(Self::from_parts(inner, conn))
    }

    /// 包裝已建立的連接
    pub fn from_parts(inner: RedisClient, conn: MultiplexedConnection) -> Self {
        Self {
            inner,
            conn,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    /// `scan_matching` 使用的 COUNT 提示
    pub fn with_scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = scan_count;
        self
    }

    /// 底層的 `redis::Client`
    pub fn inner(&self) -> &RedisClient {
        &self.inner
    }

    /// 共享連接的 clone，可直接執行未包裝的命令
    pub fn connection(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    /// 測試連接是否有效
    pub async fn test_connection(&self) -> bool {
        match self.ping().await {
            Ok(_) => true,
            Err(err) => {
                warn!("redis connection test failed: {}", err);
                false
            }
        }
    }

    pub async fn get(&self, key: &str) -> Result<String> {
        commands::get(&mut self.connection(), key).await
    }

    pub async fn set<V>(
        &self,
        key: &str,
        value: V,
        expiration: impl Into<Option<Duration>>,
    ) -> Result<()>
    where
        V: ToRedisArgs + fmt::Debug + Send + Sync,
    {
        commands::set(&mut self.connection(), key, value, expiration).await
    }

    pub async fn del(&self, key: &str) -> Result<i64> {
        commands::del(&mut self.connection(), key).await
    }

    pub async fn ping(&self) -> Result<String> {
        commands::ping(&mut self.connection()).await
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<String> {
        commands::hget(&mut self.connection(), key, field).await
    }

    pub async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>> {
        commands::hget_all(&mut self.connection(), key).await
    }

    pub async fn hset<F, V>(&self, key: &str, items: &[(F, V)]) -> Result<i64>
    where
        F: ToRedisArgs + fmt::Debug + Send + Sync,
        V: ToRedisArgs + fmt::Debug + Send + Sync,
    {
        commands::hset(&mut self.connection(), key, items).await
    }

    pub async fn hdel(&self, key: &str, fields: &[&str]) -> Result<i64> {
        commands::hdel(&mut self.connection(), key, fields).await
    }

    pub async fn rpush<V>(&self, key: &str, values: V) -> Result<i64>
    where
        V: ToRedisArgs + fmt::Debug + Send + Sync,
    {
        commands::rpush(&mut self.connection(), key, values).await
    }

    /// LPOP，鍵不存在或列表為空時返回 `NoValue`
    pub async fn lpop(&self, key: &str) -> Result<String> {
        commands::lpop(&mut self.connection(), key).await
    }

    pub async fn blpop<K>(&self, timeout: Duration, keys: &[K]) -> Result<NameAndValue<String, String>>
    where
        K: ToRedisArgs + fmt::Debug + Send + Sync,
    {
        let mut conn = open_connection(&self.inner).await?;
        commands::blpop(&mut conn, timeout, keys).await
    }

    /// 返回（鍵, 下一個游標）
    pub async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(Vec<String>, u64)> {
        commands::scan(&mut self.connection(), cursor, pattern, count).await
    }

    pub async fn publish<M>(&self, channel: &str, message: M) -> Result<i64>
    where
        M: ToRedisArgs + fmt::Debug + Send + Sync,
    {
        commands::publish(&mut self.connection(), channel, message).await
    }

    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        commands::ttl(&mut self.connection(), key).await
    }

    pub async fn expire(&self, key: &str, expiration: Duration) -> Result<bool> {
        commands::expire(&mut self.connection(), key, expiration).await
    }

    pub fn scan_values(&self, opts: ScanOpts) -> BoxStream<'static, Result<String>> {
        streams::scan_values(self.connection(), opts)
    }

    /// 以客戶端的 COUNT 設定掃描符合 `pattern` 的鍵
    pub fn scan_matching(&self, pattern: impl Into<String>) -> BoxStream<'static, Result<String>> {
        self.scan_values(ScanOpts::matching(pattern).with_count(self.scan_count))
    }

    /// 在專用連接上重複 BLPOP，連接在第一次 poll 時建立，隨串流一起釋放
    pub fn blpop_values<K: Into<String>>(
        &self,
        opts: BlpopOpts,
        keys: impl IntoIterator<Item = K>,
    ) -> BoxStream<'static, Result<NameAndValue<String, String>>> {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let inner = self.inner.clone();

        stream::once(async move { open_connection(&inner).await })
            .flat_map(move |conn| match conn {
                Ok(conn) => streams::blpop_values(conn, opts, keys.clone()),
                Err(err) => stream::iter([Err(err)]).boxed(),
            })
            .boxed()
    }

    pub fn lpop_values(&self, key: impl Into<String>) -> BoxStream<'static, Result<String>> {
        streams::lpop_values(self.connection(), key.into())
    }

    /// 以 PSUBSCRIBE 訂閱模式，返回（頻道, 內容）串流
    ///
    /// 訂閱使用獨立的連接；丟棄串流即關閉該連接。
    /// 無法解碼為字串的訊息會被略過並記錄警告。
    pub async fn psubscribe<P>(
        &self,
        patterns: &[P],
    ) -> Result<BoxStream<'static, NameAndValue<String, String>>>
    where
        P: ToRedisArgs + fmt::Debug + Send + Sync,
    {
        debug!("psubscribe: patterns={:?}", patterns);

        let context = || format!("psubscribe failed: patterns={:?}", patterns);
        let mut pubsub = self
            .inner
            .get_async_pubsub()
            .await
            .map_err(|err| failed(context(), err))?;
        pubsub
            .psubscribe(patterns)
            .await
            .map_err(|err| failed(context(), err))?;

        let messages = pubsub
            .into_on_message()
            .filter_map(|msg| async move { decode_message(&msg) });

        Ok(messages.boxed())
    }
}

/// 訂閱訊息轉為（頻道, 內容），內容無法解碼為字串時略過
fn decode_message(msg: &Msg) -> Option<NameAndValue<String, String>> {
    match msg.get_payload::<String>() {
        Ok(payload) => Some(NameAndValue {
            name: msg.get_channel_name().to_string(),
            value: payload,
        }),
        Err(err) => {
            warn!(
                "dropping undecodable message on {}: {}",
                msg.get_channel_name(),
                err
            );
            None
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.inner.get_connection_info().addr)
            .field("db", &self.inner.get_connection_info().redis.db)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RedisxError;
    use assert_matches::assert_matches;
    use redis::Value;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::{sleep, timeout};

    const BLPOP_HOLD: Duration = Duration::from_secs(2);

    /// 讀取一個以 RESP 陣列送出的命令
    async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Vec<String>> {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        let argc: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            line.clear();
            reader.read_line(&mut line).await.ok()?;
            let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
            let mut buf = vec![0; len + 2];
            reader.read_exact(&mut buf).await.ok()?;
            buf.truncate(len);
            args.push(String::from_utf8_lossy(&buf).into_owned());
        }
        Some(args)
    }

    /// 和 Redis 一樣依序處理同一連接上的命令，BLPOP 佔住連接 `BLPOP_HOLD` 後回覆超時
    async fn serve(socket: TcpStream) {
        let (reader, mut writer) = socket.into_split();
        let mut reader = BufReader::new(reader);

        while let Some(args) = read_command(&mut reader).await {
            let name = args.first().map(|arg| arg.to_ascii_uppercase());
            let reply: &[u8] = match name.as_deref() {
                Some("BLPOP") => {
                    sleep(BLPOP_HOLD).await;
                    b"*-1\r\n"
                }
                Some("GET") => b"$-1\r\n",
                Some("PING") => b"+PONG\r\n",
                _ => b"+OK\r\n",
            };
            if writer.write_all(reply).await.is_err() {
                return;
            }
        }
    }

    async fn sequential_server_client() -> Client {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket));
            }
        });

        let inner = RedisClient::open(format!("redis://{}", addr)).unwrap();
        Client::new(inner).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_is_not_blocked_by_blpop_values() {
        let client = sequential_server_client().await;

        let mut pops = client.blpop_values(BlpopOpts::new(BLPOP_HOLD), ["jobs"]);
        let pending = tokio::spawn(async move { pops.next().await });
        sleep(Duration::from_millis(100)).await;

        let reply = timeout(Duration::from_millis(500), client.clone().get("k")).await;
        assert_matches!(reply, Ok(Err(RedisxError::NotFound)));
        pending.abort();
    }

    #[tokio::test]
    async fn test_get_is_not_blocked_by_blpop() {
        let client = sequential_server_client().await;

        let popper = client.clone();
        let pending = tokio::spawn(async move { popper.blpop(BLPOP_HOLD, &["jobs"]).await });
        sleep(Duration::from_millis(100)).await;

        let reply = timeout(Duration::from_millis(500), client.get("k")).await;
        assert_matches!(reply, Ok(Err(RedisxError::NotFound)));
        pending.abort();
    }

    #[tokio::test]
    async fn test_connect_failure_names_address() {
        let inner = RedisClient::open("redis://127.0.0.1:1").unwrap();

        let err = Client::new(inner).await.unwrap_err();
        assert_matches!(err, RedisxError::Command { ref context, .. } if context == "connect failed: addr=127.0.0.1:1");
    }

    #[test]
    fn test_decode_message() {
        let value = Value::Array(vec![
            Value::BulkString(b"pmessage".to_vec()),
            Value::BulkString(b"news.*".to_vec()),
            Value::BulkString(b"news.1".to_vec()),
            Value::BulkString(b"hello".to_vec()),
        ]);
        let msg = Msg::from_value(&value).unwrap();

        assert_eq!(
            decode_message(&msg),
            Some(NameAndValue {
                name: "news.1".to_string(),
                value: "hello".to_string()
            })
        );
    }

    #[test]
    fn test_decode_message_skips_undecodable_payload() {
        let value = Value::Array(vec![
            Value::BulkString(b"pmessage".to_vec()),
            Value::BulkString(b"news.*".to_vec()),
            Value::BulkString(b"news.1".to_vec()),
            Value::BulkString(vec![0xff, 0xfe, 0xfd]),
        ]);
        let msg = Msg::from_value(&value).unwrap();

        assert_eq!(decode_message(&msg), None);
    }
}
