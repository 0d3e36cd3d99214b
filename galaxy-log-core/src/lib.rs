pub mod capture;
pub mod common;
pub mod error;
pub mod record;

pub use capture::{CaptureBuffer, ResponseCapture};
pub use error::{OplogError, Result};
pub use record::{new_operation_log_record, Opt, OperationLogRecord, Rsp};
