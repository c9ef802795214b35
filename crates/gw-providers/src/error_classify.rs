//! `classify_error(vendor_error) -> {retryable, non_retryable, rate_limited,
//! auth, permission, client, server}` (spec §4.2).

use std::collections::HashMap;

use gw_core::error::ErrorKind;
use serde_json::Value;

/// The classification bucket for a vendor error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
    RateLimited,
    Auth,
    Permission,
    Client,
    Server,
}

/// A classified vendor error: its class, an optional `Retry-After` hint
/// (seconds), and the original message.
#[derive(Clone, Debug)]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub retry_after_secs: Option<u64>,
    pub message: String,
}

/// Classify an HTTP status + optional body/headers into an [`ErrorClass`].
/// Shared by every adapter's `classify_error` so status-code conventions
/// stay consistent across vendors.
pub fn classify_http(status: u16, body: &Value, retry_after_secs: Option<u64>) -> ClassifiedError {
    let message = body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("upstream error")
        .to_string();

    let class = match status {
        401 => ErrorClass::Auth,
        403 => ErrorClass::Permission,
        429 => ErrorClass::RateLimited,
        400 | 404 | 422 => ErrorClass::Client,
        500..=599 => ErrorClass::Server,
        _ => ErrorClass::NonRetryable,
    };

    ClassifiedError {
        class,
        retry_after_secs,
        message,
    }
}

/// Map a classified vendor error onto the gateway's unified [`ErrorKind`]
/// (spec §7's error-kind table), so a 401/403/400 from any vendor reaches
/// the client as the correct wire error instead of a blanket `Upstream5xx`.
pub fn error_kind_for_class(class: ErrorClass) -> ErrorKind {
    match class {
        ErrorClass::Auth => ErrorKind::Auth,
        ErrorClass::Permission => ErrorKind::Permission,
        ErrorClass::Client => ErrorKind::Validation,
        ErrorClass::RateLimited => ErrorKind::RateLimitedUpstream,
        ErrorClass::Server | ErrorClass::Retryable | ErrorClass::NonRetryable => ErrorKind::Upstream5xx,
    }
}

/// Parse a `Retry-After` header value (seconds) out of a vendor response's
/// headers, case-insensitively.
pub fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<u64> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, v)| v.trim().parse::<u64>().ok())
}

impl ClassifiedError {
    /// Whether the worker pool should retry within its own retry budget
    /// (spec §4.3): transient errors, 5xx, and rate-limit-with-Retry-After.
    pub fn is_worker_retryable(&self) -> bool {
        matches!(self.class, ErrorClass::Server | ErrorClass::RateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_status_classified_correctly() {
        let err = classify_http(429, &Value::Null, Some(2));
        assert_eq!(err.class, ErrorClass::RateLimited);
        assert!(err.is_worker_retryable());
    }

    #[test]
    fn auth_status_is_not_retryable() {
        let err = classify_http(401, &Value::Null, None);
        assert_eq!(err.class, ErrorClass::Auth);
        assert!(!err.is_worker_retryable());
    }

    #[test]
    fn forbidden_status_classified_as_permission() {
        let err = classify_http(403, &Value::Null, None);
        assert_eq!(err.class, ErrorClass::Permission);
        assert!(!err.is_worker_retryable());
    }

    #[test]
    fn error_kind_mapping_matches_wire_table() {
        assert_eq!(error_kind_for_class(ErrorClass::Auth), ErrorKind::Auth);
        assert_eq!(error_kind_for_class(ErrorClass::Permission), ErrorKind::Permission);
        assert_eq!(error_kind_for_class(ErrorClass::Client), ErrorKind::Validation);
        assert_eq!(error_kind_for_class(ErrorClass::RateLimited), ErrorKind::RateLimitedUpstream);
        assert_eq!(error_kind_for_class(ErrorClass::Server), ErrorKind::Upstream5xx);
    }

    #[test]
    fn retry_after_header_parsed_case_insensitively() {
        let mut headers = HashMap::new();
        headers.insert("Retry-After".to_string(), "12".to_string());
        assert_eq!(retry_after_from_headers(&headers), Some(12));
    }
}
