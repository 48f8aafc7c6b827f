use redis::{Client as RedisClient, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::client::Client;
use crate::commands::failed;
use crate::config::types::RedisConfig;
use crate::config::validation::Validator;
use crate::error::{RedisxError, Result};
use crate::streams::DEFAULT_SCAN_COUNT;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis客戶端工廠
///
/// 保存連接參數，每次 `connect` 建立一個新的 `Client` 並以 PING 驗證。
#[derive(Clone)]
pub struct ClientFactory {
    host: String,
    port: u16,
    database: i64,
    password: String,
    use_tls: bool,
    connect_timeout: Duration,
    scan_count: usize,
}

impl ClientFactory {
    /// `password` 為空字串時不進行認證
    pub fn new(host: impl Into<String>, port: u16, database: i64, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            database,
            password: password.into(),
            use_tls: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    /// 本機 Redis（127.0.0.1:6379, db 0）
    pub fn local() -> Self {
        Self::new("127.0.0.1", 6379, 0, "")
    }

    /// 從配置建立，配置無效時返回 `Config` 錯誤
    pub fn from_config(config: &RedisConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self::new(
            config.host.clone(),
            config.port,
            config.database,
            config.password.clone(),
        )
        .with_tls(config.use_tls)
        .with_connect_timeout(Duration::from_secs(config.connection_timeout_secs))
        .with_scan_count(config.scan_count))
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_scan_count(mut self, scan_count: usize) -> Self {
        self.scan_count = scan_count;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        let addr = if self.use_tls {
            ConnectionAddr::TcpTls {
                host: self.host.clone(),
                port: self.port,
                insecure: false,
                tls_params: None,
            }
        } else {
            ConnectionAddr::Tcp(self.host.clone(), self.port)
        };

        ConnectionInfo {
            addr,
            redis: RedisConnectionInfo {
                db: self.database,
                password: (!self.password.is_empty()).then(|| self.password.clone()),
                ..Default::default()
            },
        }
    }

    /// 建立客戶端並以 PING 驗證連接
    pub async fn connect(&self) -> Result<Client> {
        let addr = self.address();
        debug!("connecting to redis: addr={}, db={}, tls={}", addr, self.database, self.use_tls);

        let inner = RedisClient::open(self.connection_info())
            .map_err(|err| failed(format!("open failed: addr={}", addr), err))?;

        let conn = match timeout(self.connect_timeout, inner.get_multiplexed_async_connection()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => return Err(failed(format!("connect failed: addr={}", addr), err)),
            Err(_) => {
                error!("redis connect timed out after {:?}: addr={}", self.connect_timeout, addr);
                return Err(RedisxError::ConnectTimeout(self.connect_timeout));
            }
        };

        let client = Client::from_parts(inner, conn).with_scan_count(self.scan_count);
        client.ping().await?;

        info!("connected to redis: addr={}, db={}", addr, self.database);
        Ok(client)
    }
}

impl fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFactory")
            .field("addr", &self.address())
            .field("database", &self.database)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("use_tls", &self.use_tls)
            .field("connect_timeout", &self.connect_timeout)
            .field("scan_count", &self.scan_count)
            .finish()
    }
}
