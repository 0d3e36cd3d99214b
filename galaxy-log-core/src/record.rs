use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::{OplogError, Result};

/// One audit entry per HTTP request/response cycle.
///
/// Built once through [`new_operation_log_record`] and then handed to a sink
/// untouched. Empty fields are left out of the JSON form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OperationLogRecord {
    #[validate(length(min = 1))]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub op_time: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub op_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[validate(length(min = 1))]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub company: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub permission: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub module: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub param: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub trace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(rename = "ret", skip_serializing_if = "Rsp::is_empty")]
    pub rsp: Rsp,
}

impl OperationLogRecord {
    /// Checks that the actor identity (user and company) is present.
    pub fn validate_base(&self) -> Result<()> {
        self.validate()
            .map_err(|_| OplogError::header_parameter())
    }

    /// Applies further options in order, e.g. the response side once the
    /// handler has finished.
    pub fn with_options<I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = Opt>,
    {
        for apply in options {
            apply(&mut self);
        }
        self
    }
}

/// Response envelope stored under `ret`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rsp {
    #[serde(skip_serializing_if = "is_zero")]
    pub status: i32,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_id: String,
}

const RSP_KEYS: [&str; 4] = ["status", "data", "message", "request_id"];

fn is_zero(v: &i32) -> bool {
    *v == 0
}

impl Rsp {
    pub fn is_empty(&self) -> bool {
        self.status == 0
            && self.data.is_null()
            && self.message.is_empty()
            && self.request_id.is_empty()
    }

    /// Builds the envelope from a captured response body.
    ///
    /// A body that already is an envelope (`{"status": <int>, ...}` with no
    /// foreign keys) is taken as-is. Anything else is wrapped: the HTTP status
    /// becomes `status` and the body (JSON if it parses, text otherwise)
    /// becomes `data`.
    pub fn from_captured(http_status: u16, body: &[u8], request_id: &str) -> Self {
        let parsed = serde_json::from_slice::<Value>(body).ok();

        if let Some(Value::Object(map)) = &parsed {
            let is_envelope = map.get("status").is_some_and(Value::is_i64)
                && map.keys().all(|k| RSP_KEYS.contains(&k.as_str()));
            if is_envelope {
                if let Ok(mut rsp) = serde_json::from_value::<Rsp>(Value::Object(map.clone())) {
                    if rsp.request_id.is_empty() {
                        rsp.request_id = request_id.to_string();
                    }
                    return rsp;
                }
            }
        }

        let data = match parsed {
            Some(v) => v,
            None if body.is_empty() => Value::Null,
            None => Value::String(String::from_utf8_lossy(body).into_owned()),
        };

        Self {
            status: i32::from(http_status),
            data,
            message: String::new(),
            request_id: request_id.to_string(),
        }
    }
}

/// Functional option mutating one field of a record under construction.
pub type Opt = Box<dyn FnOnce(&mut OperationLogRecord) + Send>;

/// Creates a record for `module`/`trace` and applies `options` in order.
/// A later option writing the same field overrides an earlier one.
pub fn new_operation_log_record<I>(
    module: impl Into<String>,
    trace: impl Into<String>,
    options: I,
) -> OperationLogRecord
where
    I: IntoIterator<Item = Opt>,
{
    OperationLogRecord {
        module: module.into(),
        trace: trace.into(),
        ..Default::default()
    }
    .with_options(options)
}

macro_rules! string_option {
    ($(#[$meta:meta])* $name:ident => $field:ident) => {
        $(#[$meta])*
        pub fn $name(value: impl Into<String>) -> Opt {
            let value = value.into();
            Box::new(move |record: &mut OperationLogRecord| record.$field = value)
        }
    };
}

string_option!(with_op_time => op_time);
string_option!(
    /// Caller supplied operation tag such as `create` or `query`.
    with_op_type => op_type
);
string_option!(with_method => method);
string_option!(with_ip => ip);
string_option!(with_url => url);
string_option!(with_created_at => created_at);
string_option!(with_param => param);
string_option!(with_user => user);
string_option!(with_company => company);
string_option!(with_permission => permission);
string_option!(with_module => module);
string_option!(with_trace => trace);

pub fn with_rsp(rsp: Rsp) -> Opt {
    Box::new(move |record: &mut OperationLogRecord| record.rsp = rsp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_record() -> OperationLogRecord {
        new_operation_log_record(
            "orders",
            "trace-1",
            vec![
                with_op_time("2024-01-02 03:04:05"),
                with_op_type("create"),
                with_method("POST"),
                with_ip("10.0.0.1:5555"),
                with_url("/orders?x=1"),
                with_created_at("2024-01-02 03:04:06"),
                with_param(r#"{"qty":3}"#),
                with_rsp(Rsp {
                    status: 200,
                    data: json!({"id": 9}),
                    message: "ok".to_string(),
                    request_id: "req-7".to_string(),
                }),
                with_user("42"),
                with_company("7"),
                with_permission("admin"),
            ],
        )
    }

    #[test]
    fn builder_sets_module_and_trace() {
        let record = new_operation_log_record("orders", "t-9", Vec::new());
        assert_eq!(record.module, "orders");
        assert_eq!(record.trace, "t-9");
        assert!(record.user.is_empty());
    }

    #[test]
    fn later_option_wins() {
        let record = new_operation_log_record(
            "m",
            "t",
            vec![with_user("u1"), with_user("u2")],
        );
        assert_eq!(record.user, "u2");
    }

    #[test]
    fn options_can_override_module_and_trace() {
        let record = new_operation_log_record("m", "t", vec![with_module("m2"), with_trace("t2")]);
        assert_eq!(record.module, "m2");
        assert_eq!(record.trace, "t2");
    }

    #[test]
    fn with_options_extends_a_built_record() {
        let record = new_operation_log_record("m", "t", vec![with_user("u"), with_op_type("query")])
            .with_options(vec![with_op_type("export"), with_created_at("2024-05-06 07:08:09")]);
        assert_eq!(record.user, "u");
        assert_eq!(record.op_type, "export");
        assert_eq!(record.created_at, "2024-05-06 07:08:09");
    }

    #[test]
    fn validate_base_requires_user_and_company() {
        let ok = new_operation_log_record("m", "t", vec![with_user("u"), with_company("c")]);
        assert!(ok.validate_base().is_ok());

        let no_user = new_operation_log_record("m", "t", vec![with_company("c")]);
        assert_eq!(no_user.validate_base(), Err(OplogError::header_parameter()));

        let no_company = new_operation_log_record("m", "t", vec![with_user("u")]);
        assert_eq!(
            no_company.validate_base().unwrap_err().to_string(),
            "header parameter error"
        );
    }

    #[test]
    fn permission_is_optional() {
        let record = new_operation_log_record("m", "t", vec![with_user("u"), with_company("c")]);
        assert!(record.permission.is_empty());
        assert!(record.validate_base().is_ok());
    }

    #[test]
    fn json_uses_wire_names() {
        let value = serde_json::to_value(full_record()).unwrap();
        assert_eq!(value["user"], "42");
        assert_eq!(value["op_time"], "2024-01-02 03:04:05");
        assert_eq!(value["op_type"], "create");
        assert_eq!(value["company"], "7");
        assert_eq!(value["created_at"], "2024-01-02 03:04:06");
        assert_eq!(value["ret"]["status"], 200);
        assert_eq!(value["ret"]["request_id"], "req-7");
        assert_eq!(value["ret"]["data"]["id"], 9);
    }

    #[test]
    fn json_round_trip_keeps_fields() {
        let record = full_record();
        let text = serde_json::to_string(&record).unwrap();
        let back: OperationLogRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn empty_fields_are_omitted() {
        let record = new_operation_log_record("m", "", vec![with_user("u")]);
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["module", "user"]);
    }

    #[test]
    fn partial_rsp_omits_defaults() {
        let rsp = Rsp {
            status: 404,
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&rsp).unwrap(), json!({"status": 404}));
        assert!(Rsp::default().is_empty());
        assert!(!rsp.is_empty());
    }

    #[test]
    fn captured_envelope_is_decoded() {
        let body = br#"{"status":1001,"data":[1,2],"message":"denied"}"#;
        let rsp = Rsp::from_captured(200, body, "req-1");
        assert_eq!(rsp.status, 1001);
        assert_eq!(rsp.data, json!([1, 2]));
        assert_eq!(rsp.message, "denied");
        assert_eq!(rsp.request_id, "req-1");
    }

    #[test]
    fn captured_envelope_keeps_own_request_id() {
        let body = br#"{"status":0,"request_id":"inner"}"#;
        let rsp = Rsp::from_captured(200, body, "outer");
        assert_eq!(rsp.request_id, "inner");
    }

    #[test]
    fn captured_plain_json_is_wrapped() {
        let body = br#"{"status":"active","id":3}"#;
        let rsp = Rsp::from_captured(201, body, "");
        assert_eq!(rsp.status, 201);
        assert_eq!(rsp.data, json!({"status": "active", "id": 3}));
    }

    #[test]
    fn captured_text_becomes_string_data() {
        let rsp = Rsp::from_captured(500, b"boom", "r");
        assert_eq!(rsp.status, 500);
        assert_eq!(rsp.data, Value::String("boom".to_string()));
    }

    #[test]
    fn captured_empty_body_has_null_data() {
        let rsp = Rsp::from_captured(204, b"", "");
        assert_eq!(rsp.status, 204);
        assert!(rsp.data.is_null());
    }
}
