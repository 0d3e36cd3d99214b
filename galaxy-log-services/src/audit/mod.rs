pub mod base_info;
pub mod capture_body;
pub mod middleware;
pub mod sink;

pub use base_info::{base_info, client_addr, request_param};
pub use capture_body::CaptureBody;
pub use middleware::{oplog_middleware, OpType, OplogState};
pub use sink::{ChannelSink, OplogSink, TracingSink};
