use config::{Config, ConfigError, Environment as ConfigEnvironment, File};
use std::env;
use std::path::Path;

/// 環境類型枚舉
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// 從 `REDISX_ENV` 取得當前環境設定
    pub fn from_env() -> Self {
        match env::var("REDISX_ENV")
            .unwrap_or_else(|_| "development".into())
            .to_lowercase()
            .as_str()
        {
            "production" => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// 轉換為配置文件名
    pub fn as_filename(&self) -> &'static str {
        match self {
            Environment::Development => "development.toml",
            Environment::Production => "production.toml",
        }
    }
}

/// 配置加載器，負責根據環境加載適當的配置
pub struct ConfigLoader;

impl ConfigLoader {
    /// 載入指定環境的配置
    ///
    /// 配置文件可有可無；`REDISX__` 開頭的環境變數覆蓋文件中的值，
    /// 例如 `REDISX__REDIS__PORT=6380`。
    pub fn load(env: Environment) -> Result<Config, ConfigError> {
        let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());
        let config_path = Path::new(&config_dir).join(env.as_filename());

        Config::builder()
            .add_source(File::from(config_path).required(false))
            .add_source(
                ConfigEnvironment::with_prefix("REDISX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
    }

    /// 載入當前環境的配置
    pub fn load_current() -> Result<Config, ConfigError> {
        Self::load(Environment::from_env())
    }
}
