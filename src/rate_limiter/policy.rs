use axum::http::HeaderMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub const CLIENT_ID_HEADER: &str = "x-client-id";
const MAX_KEY_LEN: usize = 128;

/// Per-prefix override of the global limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathPolicy {
    pub prefix: String,
    pub requests_per_window: u32,
    pub window_duration: Duration,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyParseError {
    #[error("Empty policy specification")]
    EmptySpec,

    #[error("Invalid policy format '{spec}': expected 'prefix:limit:window_secs', got {parts} parts")]
    InvalidFormat { spec: String, parts: usize },

    #[error("Path '{path}' must start with '/'")]
    InvalidPathFormat { path: String },

    #[error("Invalid limit '{value}' in '{spec}': {reason}")]
    InvalidLimit {
        spec: String,
        value: String,
        reason: String,
    },

    #[error("Invalid window '{value}' in '{spec}': {reason}")]
    InvalidWindow {
        spec: String,
        value: String,
        reason: String,
    },

    #[error("Window duration must be at least 1 second, got {window_secs}")]
    WindowTooSmall { window_secs: u64 },

    #[error("Limit must be at least 1, got {limit}")]
    LimitTooSmall { limit: u32 },
}

/// Parses one `prefix:limit:window_secs` entry, e.g. `/api/v1/reports:30:60`.
pub fn parse_path_policy(spec: &str) -> Result<PathPolicy, PolicyParseError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(PolicyParseError::EmptySpec);
    }

    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 3 {
        return Err(PolicyParseError::InvalidFormat {
            spec: spec.to_string(),
            parts: parts.len(),
        });
    }

    let path = parts[0].trim();
    if !path.starts_with('/') {
        return Err(PolicyParseError::InvalidPathFormat {
            path: path.to_string(),
        });
    }

    let limit: u32 = parts[1]
        .trim()
        .parse()
        .map_err(|e| PolicyParseError::InvalidLimit {
            spec: spec.to_string(),
            value: parts[1].to_string(),
            reason: format!("{}", e),
        })?;
    if limit < 1 {
        return Err(PolicyParseError::LimitTooSmall { limit });
    }

    let window_secs: u64 =
        parts[2]
            .trim()
            .parse()
            .map_err(|e| PolicyParseError::InvalidWindow {
                spec: spec.to_string(),
                value: parts[2].to_string(),
                reason: format!("{}", e),
            })?;
    if window_secs < 1 {
        return Err(PolicyParseError::WindowTooSmall { window_secs });
    }

    Ok(PathPolicy {
        prefix: path.trim_end_matches('/').to_string(),
        requests_per_window: limit,
        window_duration: Duration::from_secs(window_secs),
    })
}

/// Parses a comma-separated list, returning the good policies and one
/// warning per rejected entry.
pub fn parse_path_policies(policies_str: &str) -> (Vec<PathPolicy>, Vec<String>) {
    let mut policies = Vec::new();
    let mut warnings = Vec::new();

    for spec in policies_str
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        match parse_path_policy(spec) {
            Ok(policy) => policies.push(policy),
            Err(e) => warnings.push(format!("Skipping invalid path policy '{}': {}", spec, e)),
        }
    }

    (policies, warnings)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn bounded(key: &str) -> String {
    key.chars().take(MAX_KEY_LEN).collect()
}

/// Identifies the caller: `X-Client-Id`, then the first `X-Forwarded-For`
/// hop, then `X-Real-IP`, else `unknown`.
pub fn client_key(headers: &HeaderMap) -> String {
    if let Some(client_id) = header_str(headers, CLIENT_ID_HEADER) {
        return bounded(client_id);
    }
    if let Some(first) = header_str(headers, "x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return bounded(first);
    }
    if let Some(real_ip) = header_str(headers, "x-real-ip") {
        return bounded(real_ip);
    }
    "unknown".to_string()
}

fn is_id_segment(segment: &str) -> bool {
    (!segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
        || Uuid::parse_str(segment).is_ok()
}

/// Collapses numeric and UUID segments to `:id` so one client hitting many
/// records shares a single counter.
pub fn normalize_endpoint(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| if is_id_segment(segment) { ":id" } else { segment })
        .collect();
    format!("/{}", segments.join("/"))
}

/// The counter key for `path`: the longest matching policy prefix, otherwise
/// the normalised path.
pub fn endpoint_key<'a>(path: &str, policies: &'a [PathPolicy]) -> (String, Option<&'a PathPolicy>) {
    let matched = policies
        .iter()
        .filter(|policy| path.starts_with(policy.prefix.as_str()))
        .max_by_key(|policy| policy.prefix.len());
    match matched {
        Some(policy) => (policy.prefix.clone(), Some(policy)),
        None => (normalize_endpoint(path), None),
    }
}
