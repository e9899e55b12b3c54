pub mod analytics;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod jobs;
pub mod monitor;
pub mod replay;
pub mod telemetry;

pub use error::{MonitorError, Result};
pub use monitor::Monitor;
