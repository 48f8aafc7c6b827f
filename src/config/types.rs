use serde::{Deserialize, Serialize};
use crate::config::validation::{ValidationError, ValidationUtils, Validator};
use crate::streams::DEFAULT_SCAN_COUNT;

/// 應用程序配置結構
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub redis: RedisConfig,
    pub log: LogConfig,
}

impl Validator for ApplicationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        self.redis.validate()?;
        self.log.validate()?;

        Ok(())
    }
}

/// 日誌配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Validator for LogConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // 驗證日誌級別
        ValidationUtils::one_of(
            &self.level.to_lowercase().as_str(),
            &["trace", "debug", "info", "warn", "error"],
            "log.level",
        )?;

        // 驗證日誌格式
        ValidationUtils::one_of(
            &self.format.to_lowercase().as_str(),
            &["pretty", "compact"],
            "log.format",
        )?;

        Ok(())
    }
}

/// Redis配置
///
/// `password` 為空字串時不進行認證。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: String,
    pub use_tls: bool,
    pub connection_timeout_secs: u64,
    pub scan_count: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: String::new(),
            use_tls: false,
            connection_timeout_secs: 5,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }
}

impl Validator for RedisConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::not_empty(&self.host, "redis.host")?;
        ValidationUtils::in_range(self.port, 1, u16::MAX, "redis.port")?;
        ValidationUtils::in_range(self.database, 0, 15, "redis.database")?;
        ValidationUtils::in_range(self.connection_timeout_secs, 1, 60, "redis.connection_timeout_secs")?;
        ValidationUtils::in_range(self.scan_count, 1, 100_000, "redis.scan_count")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config_is_valid() {
        let config = ApplicationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.redis.port, 6379);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_redis_config_validation() {
        let config = RedisConfig {
            host: "  ".to_string(),
            ..RedisConfig::default()
        };
        assert_matches!(config.validate(), Err(ValidationError::MissingField(field)) if field == "redis.host");

        let config = RedisConfig {
            database: 16,
            ..RedisConfig::default()
        };
        assert_matches!(
            config.validate(),
            Err(ValidationError::RangeError { field, .. }) if field == "redis.database"
        );

        let config = RedisConfig {
            port: 0,
            ..RedisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_config_validation() {
        let config = LogConfig {
            level: "DEBUG".to_string(),
            format: "compact".to_string(),
        };
        assert!(config.validate().is_ok());

        let config = LogConfig {
            level: "verbose".to_string(),
            ..LogConfig::default()
        };
        assert_matches!(config.validate(), Err(ValidationError::InvalidValue(_)));
    }
}
