use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, OriginalUri, Query, Request},
    http::{HeaderMap, Method, Uri},
};
use futures::{stream, StreamExt};
use galaxy_log_core::common::{
    now_formatted, to_json_string, COMPANY_ID_KEY, PERMISSION_KEY, USER_ID_KEY,
};
use galaxy_log_core::record::{
    new_operation_log_record, with_company, with_ip, with_method, with_op_time, with_param,
    with_permission, with_url, with_user,
};
use galaxy_log_core::{OperationLogRecord, OplogError, Result};
use http_body::Body as HttpBody;
use tracing::debug;

/// Raw header text; bytes outside UTF-8 are replaced rather than dropped.
fn header_value(headers: &HeaderMap, key: &str) -> String {
    headers
        .get(key)
        .map(|h| String::from_utf8_lossy(h.as_bytes()).into_owned())
        .unwrap_or_default()
}

/// Reads actor identity and request metadata into a new record.
///
/// Fails with [`OplogError::Validation`] before the body is touched when
/// `CompanyID` or `UserID` is missing or empty. `Permission` is optional.
/// At most `max_param_bytes` of a request body are buffered for the param.
pub async fn base_info(
    request: &mut Request,
    module: &str,
    trace: &str,
    max_param_bytes: Option<usize>,
) -> Result<OperationLogRecord> {
    let headers = request.headers();
    let identity = new_operation_log_record(
        module,
        trace,
        vec![
            with_user(header_value(headers, USER_ID_KEY)),
            with_company(header_value(headers, COMPANY_ID_KEY)),
            with_permission(header_value(headers, PERMISSION_KEY)),
        ],
    );
    identity.validate_base()?;

    let method = request.method().to_string();
    let url = request_uri(request);
    let ip = client_addr(request);
    let op_time = now_formatted();
    let param = request_param(request, max_param_bytes).await;

    Ok(identity.with_options(vec![
        with_method(method),
        with_url(url),
        with_ip(ip),
        with_op_time(op_time),
        with_param(param),
    ]))
}

/// Path and query as the client sent them, including any prefix a nesting
/// router stripped.
fn request_uri(request: &Request) -> String {
    let uri = match request.extensions().get::<OriginalUri>() {
        Some(OriginalUri(original)) => original,
        None => request.uri(),
    };
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Peer address when the server exposes connect info, else the first
/// forwarded hop.
pub fn client_addr(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .or_else(|| request.headers().get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .unwrap_or_default()
}

/// String form of the request parameters for the audit record.
///
/// Bodies of POST/PUT/DELETE are read once and put back as a fresh body, so
/// the handler still sees every byte. GET yields the query as JSON. Any other
/// method, a body that fails to read, or one larger than `max_bytes` yields
/// an empty string.
pub async fn request_param(request: &mut Request, max_bytes: Option<usize>) -> String {
    match *request.method() {
        Method::POST | Method::PUT | Method::DELETE => {
            if request.body().is_end_stream() {
                return String::new();
            }
            match tee_body(request, max_bytes).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    debug!(error = %e, "Request body not logged, using empty param");
                    String::new()
                }
            }
        }
        Method::GET => query_param(request.uri()),
        _ => String::new(),
    }
}

enum Drain {
    Complete,
    Overflow(usize),
    Failed(axum::Error),
}

/// Drains the original body exactly once, then installs a replacement that
/// replays the drained bytes from the start.
///
/// A read error is replayed to the handler after the bytes that preceded it.
/// Past `limit` draining stops: the handler gets the bytes read so far
/// followed by the unread rest of the original stream.
async fn tee_body(request: &mut Request, limit: Option<usize>) -> Result<Bytes> {
    let original = std::mem::replace(request.body_mut(), Body::empty());
    let mut data = original.into_data_stream();
    let mut captured: Vec<u8> = Vec::new();

    let drain = loop {
        match data.next().await {
            None => break Drain::Complete,
            Some(Ok(bytes)) => {
                captured.extend_from_slice(&bytes);
                if let Some(limit) = limit.filter(|l| captured.len() > *l) {
                    break Drain::Overflow(limit);
                }
            }
            Some(Err(e)) => break Drain::Failed(e),
        }
    };

    let captured = Bytes::from(captured);
    match drain {
        Drain::Complete => {
            drop(data);
            *request.body_mut() = Body::from(captured.clone());
            Ok(captured)
        }
        Drain::Overflow(limit) => {
            let head = stream::iter(vec![Ok::<Bytes, axum::Error>(captured)]);
            *request.body_mut() = Body::from_stream(head.chain(data));
            Err(OplogError::BodyRead(format!(
                "request body exceeds {} bytes",
                limit
            )))
        }
        Drain::Failed(e) => {
            drop(data);
            let message = e.to_string();
            let mut replay = Vec::with_capacity(2);
            if !captured.is_empty() {
                replay.push(Ok(captured));
            }
            replay.push(Err(e));
            *request.body_mut() = Body::from_stream(stream::iter(replay));
            Err(OplogError::BodyRead(message))
        }
    }
}

/// Query pairs grouped by key, keys sorted, values in order of appearance.
fn query_param(uri: &Uri) -> String {
    match Query::<Vec<(String, String)>>::try_from_uri(uri) {
        Ok(Query(pairs)) => {
            let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (key, value) in pairs {
                values.entry(key).or_default().push(value);
            }
            to_json_string(&values)
        }
        Err(e) => {
            debug!(error = %e, "Query string unparsable, logging empty param");
            String::new()
        }
    }
}
