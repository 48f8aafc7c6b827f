/// 配置管理模組
///
/// 本模組負責加載、驗證和管理連接與日誌配置。
/// 支持從開發和生產兩種環境中加載不同的配置。
pub mod loader;
pub mod manager;
pub mod types;
pub mod validation;

// 重新導出常用組件
pub use loader::{ConfigLoader, Environment};
pub use manager::{get_config, init_config};
pub use types::*;
pub use validation::{ValidationError, ValidationUtils, Validator};
