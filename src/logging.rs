use tracing::level_filters::LevelFilter;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::types::LogConfig;

/// 解析日誌級別，無法辨識時使用 INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO, // 默認為INFO
    }
}

/// 初始化全局日誌系統
///
/// 配置的級別是預設值，`RUST_LOG` 存在時以其為準。
pub fn init_logging(log_config: &LogConfig) -> Result<(), SetGlobalDefaultError> {
    let level = parse_level(&log_config.level);
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let builder = FmtSubscriber::builder().with_env_filter(filter);
    if log_config.format.eq_ignore_ascii_case("compact") {
        tracing::subscriber::set_global_default(builder.compact().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    info!("logging initialised at {}", level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("trace", Level::TRACE)]
    #[case("DEBUG", Level::DEBUG)]
    #[case("warn", Level::WARN)]
    #[case("error", Level::ERROR)]
    #[case("verbose", Level::INFO)]
    fn test_parse_level(#[case] input: &str, #[case] want: Level) {
        assert_eq!(parse_level(input), want);
    }

    #[test]
    fn test_init_logging_only_once() {
        let config = LogConfig::default();
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
