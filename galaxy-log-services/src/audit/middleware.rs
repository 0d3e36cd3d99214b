use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use galaxy_log_core::common::now_formatted;
use galaxy_log_core::record::{with_created_at, with_op_type, with_rsp};
use galaxy_log_core::{CaptureBuffer, Rsp};
use serde_json::json;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::audit::base_info::base_info;
use crate::audit::capture_body::CaptureBody;
use crate::audit::sink::OplogSink;
use crate::config::Settings;

const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Operation tag a handler can attach to its response extensions to
/// override the one derived from the HTTP method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpType(pub String);

#[derive(Clone)]
pub struct OplogState {
    pub settings: Arc<Settings>,
    pub sink: Arc<dyn OplogSink>,
}

impl OplogState {
    pub fn new(settings: Settings, sink: impl OplogSink + 'static) -> Self {
        Self {
            settings: Arc::new(settings),
            sink: Arc::new(sink),
        }
    }
}

fn default_op_type(method: &Method) -> String {
    match *method {
        Method::POST => "create".to_string(),
        Method::PUT => "update".to_string(),
        Method::DELETE => "delete".to_string(),
        Method::GET => "query".to_string(),
        _ => method.as_str().to_lowercase(),
    }
}

fn header_string(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Records one operation log per request.
///
/// The request side is captured before the handler runs; the response body
/// is mirrored while it streams out and the finished record goes to the sink
/// once the body is done.
pub async fn oplog_middleware(
    State(state): State<OplogState>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.settings.is_skipped(request.uri().path()) {
        return next.run(request).await;
    }

    let trace_id =
        header_string(&request, REQUEST_ID_HEADER).unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = request.method().clone();

    let record = match base_info(
        &mut request,
        &state.settings.module,
        &trace_id,
        state.settings.max_param_bytes,
    )
    .await
    {
        Ok(record) => record,
        Err(e) => {
            warn!(uri = %request.uri(), trace = %trace_id, "Operation log skipped: {}", e);
            if state.settings.require_identity {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "Bad Request", "detail": e.to_string()})),
                )
                    .into_response();
            }
            return next.run(request).await;
        }
    };

    let response = next.run(request).await;

    let op_type = response
        .extensions()
        .get::<OpType>()
        .map(|t| t.0.clone())
        .unwrap_or_else(|| default_op_type(&method));
    let status = response.status().as_u16();
    let request_id = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| trace_id.clone());

    let buffer = match state.settings.max_capture_bytes {
        Some(limit) => CaptureBuffer::with_limit(limit),
        None => CaptureBuffer::new(),
    };
    let sink = state.sink.clone();

    let (parts, body) = response.into_parts();
    let body = CaptureBody::new(body, buffer, move |captured| {
        let record = record.with_options(vec![
            with_op_type(op_type),
            with_created_at(now_formatted()),
            with_rsp(Rsp::from_captured(status, &captured, &request_id)),
        ]);
        trace!(trace = %record.trace, status, bytes = captured.len(), "operation log finalized");
        sink.send(record);
    });

    Response::from_parts(parts, Body::new(body))
}
