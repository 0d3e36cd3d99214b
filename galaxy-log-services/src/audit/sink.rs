use galaxy_log_core::common::to_json_string;
use galaxy_log_core::OperationLogRecord;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Destination for finalized records. `send` must not block: it runs on the
/// response path once the body has been streamed.
pub trait OplogSink: Send + Sync {
    fn send(&self, record: OperationLogRecord);
}

/// Writes each record as one structured `oplog` event.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl OplogSink for TracingSink {
    fn send(&self, record: OperationLogRecord) {
        info!(
            target: "oplog",
            user = %record.user,
            company = %record.company,
            method = %record.method,
            url = %record.url,
            trace = %record.trace,
            record = %to_json_string(&record),
            "operation log"
        );
    }
}

/// Hands records to a background consumer through an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OperationLogRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OperationLogRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OplogSink for ChannelSink {
    fn send(&self, record: OperationLogRecord) {
        if let Err(e) = self.tx.send(record) {
            warn!(trace = %e.0.trace, "Operation log receiver closed, record dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galaxy_log_core::record::{new_operation_log_record, with_user};

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.send(new_operation_log_record("m", "t1", vec![with_user("a")]));
        sink.send(new_operation_log_record("m", "t2", vec![with_user("b")]));

        assert_eq!(rx.recv().await.unwrap().trace, "t1");
        assert_eq!(rx.recv().await.unwrap().trace, "t2");
    }

    #[test]
    fn channel_sink_tolerates_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.send(new_operation_log_record("m", "t", Vec::new()));
    }

    #[test]
    fn tracing_sink_accepts_records() {
        TracingSink.send(new_operation_log_record("m", "t", vec![with_user("u")]));
    }
}
