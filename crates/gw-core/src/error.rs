//! Unified error taxonomy (spec §7).

use thiserror::Error;

/// Result type alias used across the gateway core.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Wire-mapped error kind (spec §7 error-handling table).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Auth,
    Permission,
    BudgetExhausted,
    RateLimitedLocal,
    RateLimitedUpstream,
    Upstream5xx,
    UpstreamTimeout,
    QueueFull,
    NoSuitableKey,
    Cancelled,
    PluginShortCircuit,
    Internal,
}

impl ErrorKind {
    /// Whether a terminal error of this kind may be retried against the
    /// next entry in a request's fallback list (spec §7 table).
    pub fn fallback_eligible(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimitedUpstream
                | ErrorKind::Upstream5xx
                | ErrorKind::UpstreamTimeout
                | ErrorKind::QueueFull
                | ErrorKind::NoSuitableKey
        )
    }

    /// HTTP status code this error kind maps to at the wire boundary.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Auth => 401,
            ErrorKind::Permission => 403,
            ErrorKind::BudgetExhausted => 402,
            ErrorKind::RateLimitedLocal => 429,
            ErrorKind::RateLimitedUpstream => 429,
            ErrorKind::Upstream5xx => 502,
            ErrorKind::UpstreamTimeout => 504,
            ErrorKind::QueueFull => 429,
            ErrorKind::NoSuitableKey => 503,
            ErrorKind::Cancelled => 499,
            ErrorKind::PluginShortCircuit => 200,
            ErrorKind::Internal => 500,
        }
    }

    /// The `type` field of the JSON error envelope (spec §6).
    pub fn wire_type(self) -> &'static str {
        match self {
            ErrorKind::Validation => "invalid_request_error",
            ErrorKind::Auth => "authentication_error",
            ErrorKind::Permission => "permission_error",
            ErrorKind::BudgetExhausted => "budget_exhausted",
            ErrorKind::RateLimitedLocal | ErrorKind::RateLimitedUpstream => "rate_limit_error",
            ErrorKind::Upstream5xx | ErrorKind::UpstreamTimeout => "service_unavailable",
            ErrorKind::QueueFull => "service_unavailable",
            ErrorKind::NoSuitableKey => "service_unavailable",
            ErrorKind::Cancelled => "internal_error",
            ErrorKind::PluginShortCircuit => "internal_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

/// The gateway's unified error type. Carries enough information for the
/// orchestrator to decide on retries, fallbacks, and the wire envelope.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    /// Explicit fallback-eligibility override, settable by a plugin or a
    /// mock provider (spec §4.6: "an explicit `allow_fallbacks=true` error
    /// produced by a plugin/mock").
    pub allow_fallbacks: Option<bool>,
    /// `Retry-After` hint (seconds), carried from a vendor's error response
    /// so the worker pool's backoff (spec §4.3) can honor it instead of
    /// blind exponential backoff.
    pub retry_after_secs: Option<u64>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            allow_fallbacks: None,
            retry_after_secs: None,
            source: None,
        }
    }

    pub fn retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn allow_fallbacks(mut self, allow: bool) -> Self {
        self.allow_fallbacks = Some(allow);
        self
    }

    /// Whether this error is eligible for the fallback controller to try
    /// the next (provider, model) pair, per spec §4.6 / §7.
    pub fn is_fallback_eligible(&self) -> bool {
        self.allow_fallbacks.unwrap_or_else(|| self.kind.fallback_eligible())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, msg)
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, msg)
    }

    pub fn budget_exhausted(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BudgetExhausted, msg)
    }

    pub fn rate_limited_local(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimitedLocal, msg)
    }

    pub fn no_suitable_key(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuitableKey, msg)
    }

    pub fn queue_full(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::QueueFull, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }
}

/// The JSON error envelope returned to clients (spec §6).
#[derive(Clone, Debug, serde::Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
    pub status_code: u16,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub code: &'static str,
}

impl From<&GatewayError> for ErrorEnvelope {
    fn from(err: &GatewayError) -> Self {
        Self {
            error: ErrorBody {
                message: err.message.clone(),
                error_type: err.kind.wire_type(),
                code: err.kind.wire_type(),
            },
            status_code: err.kind.status_code(),
        }
    }
}
