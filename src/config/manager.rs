use once_cell::sync::OnceCell;
use config::ConfigError;
use tracing::{debug, warn};
use crate::config::loader::{ConfigLoader, Environment};
use crate::config::types::ApplicationConfig;
use crate::config::validation::Validator;

// 全局配置實例
static CONFIG: OnceCell<ApplicationConfig> = OnceCell::new();

/// 獲取全局配置，尚未初始化時返回 `None`
pub fn get_config() -> Option<&'static ApplicationConfig> {
    CONFIG.get()
}

/// 初始化全局配置（在應用程序啟動時調用），重複調用返回第一次的結果
pub fn init_config() -> Result<&'static ApplicationConfig, ConfigError> {
    CONFIG.get_or_try_init(|| {
        let app_config = ApplicationConfig::load_from_env()?;
        debug!("config initialised for {:?}", Environment::from_env());
        Ok(app_config)
    })
}

/// ApplicationConfig 加載方法實現
impl ApplicationConfig {
    /// 從環境變數指定的環境加載配置
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let env = Environment::from_env();
        debug!("loading config for {:?}", env);
        Self::load(env)
    }

    /// 從指定環境加載配置
    pub fn load(env: Environment) -> Result<Self, ConfigError> {
        let config_source = ConfigLoader::load(env)?;
        let app_config: ApplicationConfig = config_source.try_deserialize()?;

        // 驗證失敗只記錄警告，連接時由 ClientFactory 再次檢查
        if let Err(err) = app_config.validate() {
            warn!("config validation failed: {}", err);
        } else {
            debug!("config validated");
        }

        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;

    #[test]
    #[serial]
    fn test_load_from_file_with_env_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("development.toml"),
            r#"
[redis]
host = "cache.internal"
port = 6390
database = 2
use_tls = true

[log]
level = "debug"
"#,
        )
        .expect("write config");

        env::set_var("CONFIG_DIR", dir.path());
        env::set_var("REDISX__REDIS__PORT", "6400");

        let config = ApplicationConfig::load(Environment::Development).expect("load");
        assert_eq!(config.redis.host, "cache.internal");
        assert_eq!(config.redis.port, 6400);
        assert_eq!(config.redis.database, 2);
        assert!(config.redis.use_tls);
        assert_eq!(config.redis.scan_count, 1000);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "pretty");

        env::remove_var("REDISX__REDIS__PORT");
        env::remove_var("CONFIG_DIR");
    }

    #[test]
    #[serial]
    fn test_init_config_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        env::set_var("CONFIG_DIR", dir.path());

        let first = init_config().expect("init");
        let second = init_config().expect("init");
        assert!(std::ptr::eq(first, second));
        assert!(get_config().is_some());

        env::remove_var("CONFIG_DIR");
    }
}
