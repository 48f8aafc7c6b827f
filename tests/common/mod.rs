//! 集中化的 Redis 測試配置
//!
//! 提供一致的測試環境配置，支援本地開發與 Docker 容器。

use redisx::config::RedisConfig;
use redisx::{Client, ClientFactory};

/// Redis 測試配置建構器
pub struct RedisTestConfig;

impl RedisTestConfig {
    /// 獲取測試用 Redis 主機
    ///
    /// 優先級：
    /// 1. REDIS_TEST_HOST 環境變數
    /// 2. 檢測 Docker 環境使用 redis
    /// 3. 預設 127.0.0.1
    pub fn get_test_host() -> String {
        if let Ok(host) = std::env::var("REDIS_TEST_HOST") {
            return host;
        }

        if Self::is_docker_environment() {
            "redis".to_string()
        } else {
            "127.0.0.1".to_string()
        }
    }

    /// 檢測是否在 Docker 環境中執行
    fn is_docker_environment() -> bool {
        std::env::var("DOCKER_CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists()
    }

    /// 建立標準測試 Redis 配置
    pub fn create_test_config() -> RedisConfig {
        RedisConfig {
            host: Self::get_test_host(),
            port: std::env::var("REDIS_TEST_PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(6379),
            connection_timeout_secs: 1,
            ..RedisConfig::default()
        }
    }

    /// 連接測試 Redis；無法連接時返回 `None`，測試應直接返回
    pub async fn skip_if_redis_unavailable(test_name: &str) -> Option<Client> {
        let factory = ClientFactory::from_config(&Self::create_test_config()).ok()?;
        match factory.connect().await {
            Ok(client) => Some(client),
            Err(err) => {
                eprintln!("skipping {}: redis unavailable ({})", test_name, err);
                None
            }
        }
    }
}
