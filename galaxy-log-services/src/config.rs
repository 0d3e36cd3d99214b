use anyhow::{Context, Result};
use std::env;

/// Request bodies larger than this are served but not copied into `param`.
pub const DEFAULT_MAX_PARAM_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Settings {
    /// Module name stamped on every record.
    pub module: String,
    /// Paths served without auditing; each entry also covers its sub-paths
    /// (`/health` skips `/health/ready` but not `/healthcheck`).
    pub skip_paths: Vec<String>,
    /// Reject requests missing `UserID`/`CompanyID` with 400 instead of
    /// serving them unaudited.
    pub require_identity: bool,
    /// Upper bound on captured response bytes; `None` captures everything.
    pub max_capture_bytes: Option<usize>,
    /// Upper bound on request body bytes buffered for `param`; `None`
    /// buffers everything.
    pub max_param_bytes: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            module: "default".to_string(),
            skip_paths: vec!["/health".to_string(), "/metrics".to_string()],
            require_identity: false,
            max_capture_bytes: None,
            max_param_bytes: Some(DEFAULT_MAX_PARAM_BYTES),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let module = lookup("OPLOG_MODULE")
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.module);

        let skip_paths = match lookup("OPLOG_SKIP_PATHS") {
            Some(v) => v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            None => defaults.skip_paths,
        };

        let require_identity = lookup("OPLOG_REQUIRE_IDENTITY")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(defaults.require_identity);

        let max_capture_bytes =
            parse_limit(&lookup, "OPLOG_MAX_CAPTURE_BYTES")?.or(defaults.max_capture_bytes);
        let max_param_bytes =
            parse_limit(&lookup, "OPLOG_MAX_PARAM_BYTES")?.or(defaults.max_param_bytes);

        Ok(Self {
            module,
            skip_paths,
            require_identity,
            max_capture_bytes,
            max_param_bytes,
        })
    }

    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|p| {
            let p = p.trim_end_matches('/');
            path == p || path.strip_prefix(p).is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

fn parse_limit<F>(lookup: &F, key: &str) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) if !v.trim().is_empty() => {
            let limit = v
                .trim()
                .parse::<usize>()
                .with_context(|| format!("invalid {}: {:?}", key, v))?;
            Ok(Some(limit))
        }
        _ => Ok(None),
    }
}
