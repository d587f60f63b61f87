use fbascan_core::FieldKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Retries ran out on a transient failure; `last` is the final cause.
    #[error("fetch failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Returns `true` for failures worth retrying after a back-off delay:
    /// timeouts, connection failures, 408, 429 and 5xx responses.
    ///
    /// Other 4xx responses, malformed URLs and already-exhausted retries
    /// are permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            }
            FetchError::InvalidUrl { .. } | FetchError::Exhausted { .. } => false,
        }
    }
}

/// Raised while compiling a supplier's extraction rules.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("supplier '{supplier}' field '{field}' has invalid selector \"{selector}\": {reason}")]
    InvalidSelector {
        supplier: String,
        field: String,
        selector: String,
        reason: String,
    },

    #[error("supplier '{supplier}' has invalid item selector \"{selector}\": {reason}")]
    InvalidItemSelector {
        supplier: String,
        selector: String,
        reason: String,
    },

    #[error("supplier '{supplier}' field '{field}' has invalid regex: {source}")]
    InvalidRegex {
        supplier: String,
        field: String,
        #[source]
        source: regex::Error,
    },
}

/// Why one extracted record was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required field '{field}' matched no rule")]
    MissingRequired { field: String },

    #[error("field '{field}' value {value:?} is not a valid {kind:?}")]
    InvalidValue {
        field: String,
        kind: FieldKind,
        value: String,
    },
}

impl ValidationError {
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingRequired { field }
            | ValidationError::InvalidValue { field, .. } => field,
        }
    }
}
