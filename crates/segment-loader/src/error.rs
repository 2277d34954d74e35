use std::time::Duration;

use reqwest::StatusCode;

/// Code reported to the engine for failures that carry no HTTP status.
pub const GENERIC_ERROR_CODE: u16 = 0;

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("Unable to extract segment information from URL")]
    Translation { url: String },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("request to {url} timed out after {}ms", .timeout.as_millis())]
    Timeout { url: String, timeout: Duration },

    #[error("request aborted")]
    Aborted,

    #[error("loader is busy loading `{url}`")]
    Busy { url: String },

    #[error("loader has been destroyed")]
    Destroyed,

    #[error("level {level} is not advertised ({available} levels available)")]
    UnknownLevel { level: usize, available: usize },

    #[error("preference store error: {reason}")]
    Store { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl LoaderError {
    pub fn translation(url: impl Into<String>) -> Self {
        Self::Translation { url: url.into() }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            url: url.into(),
            timeout,
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Numeric code handed to the engine in `on_error`.
    pub fn code(&self) -> u16 {
        match self {
            Self::HttpStatus { status, .. } => status.as_u16(),
            _ => GENERIC_ERROR_CODE,
        }
    }

    /// Whether an engine-side retry has any chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Translation { .. }
            | Self::InvalidUrl { .. }
            | Self::Aborted
            | Self::Busy { .. }
            | Self::Destroyed
            | Self::UnknownLevel { .. }
            | Self::Store { .. }
            | Self::Configuration { .. }
            | Self::Json { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            Self::Network { source } => {
                source.is_connect()
                    || source.is_timeout()
                    || source.is_request()
                    || source.is_body()
                    || source.is_decode()
            }
            Self::Timeout { .. } | Self::Io { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_error_uses_fixed_message_and_code_zero() {
        let err = LoaderError::translation("http://cdn/video/720p/intro.ts");
        assert_eq!(
            err.to_string(),
            "Unable to extract segment information from URL"
        );
        assert_eq!(err.code(), GENERIC_ERROR_CODE);
        assert!(!err.is_retryable());
    }

    #[test]
    fn http_status_code_is_forwarded() {
        let err = LoaderError::http_status(StatusCode::NOT_FOUND, "http://api/segment");
        assert_eq!(err.code(), 404);
        assert!(!err.is_retryable());

        let err = LoaderError::http_status(StatusCode::BAD_GATEWAY, "http://api/segment");
        assert_eq!(err.code(), 502);
        assert!(err.is_retryable());
    }

    #[test]
    fn timeout_is_retryable_with_code_zero() {
        let err = LoaderError::timeout("http://api/segment", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "request to http://api/segment timed out after 1500ms");
        assert_eq!(err.code(), GENERIC_ERROR_CODE);
        assert!(err.is_retryable());
    }
}
