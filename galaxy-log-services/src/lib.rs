pub mod audit;
pub mod config;
pub mod logging;

pub use audit::{oplog_middleware, OpType, OplogState};
pub use config::Settings;
