use thiserror::Error;

/// Top-level error type for the `rgbw2-api` crate.
///
/// Three families: validation (rejected before any network call),
/// transport (timeouts, connection failures, non-2xx statuses; these are
/// retried by [`WhiteClient`](crate::WhiteClient)), and parse failures
/// (malformed bodies; never retried). `rgbw2-core` maps these into its own
/// error type without losing status codes or timeouts.
#[derive(Debug, Error)]
pub enum Error {
    // ── Validation ──────────────────────────────────────────────────
    /// Channel index outside `0..=3`.
    #[error("Channel must be an integer between 0 and 3. Received: {channel}")]
    InvalidChannel { channel: u8 },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A single attempt exceeded the per-request timeout.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The device answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The underlying HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    // ── Data ────────────────────────────────────────────────────────
    /// Response body was not a JSON object, with the raw body for debugging.
    #[error("Invalid Shelly response: {message}")]
    Parse { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transport-level failure worth retrying.
    ///
    /// Validation and parse errors are deterministic: repeating the request
    /// would produce the same result.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout { .. } | Self::Status { .. }
        )
    }

    /// HTTP status code, if the device produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::Timeout { timeout_ms: 2500 }.is_transient());
        assert!(
            Error::Status {
                status: 503,
                url: "http://shelly/white/0".into()
            }
            .is_transient()
        );
        assert!(!Error::InvalidChannel { channel: 4 }.is_transient());
        assert!(
            !Error::Parse {
                message: "expected object".into(),
                body: "null".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn status_is_preserved() {
        let err = Error::Status {
            status: 401,
            url: "http://shelly/white/1".into(),
        };
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "HTTP 401 from http://shelly/white/1");
    }
}
