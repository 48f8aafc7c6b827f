//! `redis` crate 之上的便利層
//!
//! - 哨兵錯誤：區分「不存在」（`NotFound`）、「沒有值」（`NoValue`）與一般失敗
//! - 寫入命令的可選過期時間
//! - SCAN、BLPOP、LPOP 與 PSUBSCRIBE 的惰性串流
//! - 以 PING 驗證連接的客戶端工廠

// 模組定義
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod factory;
pub mod logging;
pub mod streams;

pub use client::Client;
pub use commands::NameAndValue;
pub use error::{is_no_value, is_not_found, RedisxError, Result};
pub use factory::ClientFactory;
pub use streams::{BlpopOpts, ScanOpts};
