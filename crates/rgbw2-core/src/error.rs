// ── Core error types ──
//
// Errors surfaced to hosts by the channel controllers and the engine.
// Transport detail (HTTP status, timeout, URL) is kept as plain data so
// the error is `Clone`: one failed write may answer several coalesced
// brightness requests.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    // ── Validation ───────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── Transport ────────────────────────────────────────────────────
    #[error("Cannot reach device at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Device request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Device answered HTTP {status} for {url}")]
    Http { status: u16, url: String },

    // ── Data ─────────────────────────────────────────────────────────
    #[error("Invalid device response: {message}")]
    Parse { message: String },

    // ── Registry / lifecycle ─────────────────────────────────────────
    #[error("Channel not found: {key}")]
    ChannelNotFound { key: String },

    #[error("Channel controller stopped")]
    ControllerStopped,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Returns `true` for failures caused by the network or the device
    /// being unavailable, as opposed to bad input or bad configuration.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::Http { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<rgbw2_api::Error> for CoreError {
    fn from(err: rgbw2_api::Error) -> Self {
        match err {
            rgbw2_api::Error::InvalidChannel { channel } => CoreError::Validation {
                message: format!("channel must be between 0 and 3, got {channel}"),
            },
            rgbw2_api::Error::Transport(ref e) => {
                let url = e.url().map(ToString::to_string).unwrap_or_default();
                match e.status() {
                    Some(status) => CoreError::Http {
                        status: status.as_u16(),
                        url,
                    },
                    None => CoreError::ConnectionFailed {
                        url,
                        reason: e.to_string(),
                    },
                }
            }
            rgbw2_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid device URL: {e}"),
            },
            rgbw2_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            rgbw2_api::Error::Status { status, url } => CoreError::Http { status, url },
            rgbw2_api::Error::Client(message) => CoreError::Config { message },
            rgbw2_api::Error::Parse { message, body: _ } => CoreError::Parse { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_transport_detail() {
        let err = CoreError::from(rgbw2_api::Error::Status {
            status: 503,
            url: "http://10.0.0.5/white/0".into(),
        });
        assert_eq!(
            err,
            CoreError::Http {
                status: 503,
                url: "http://10.0.0.5/white/0".into()
            }
        );
        assert!(err.is_transport());

        let err = CoreError::from(rgbw2_api::Error::Timeout { timeout_ms: 2500 });
        assert_eq!(err, CoreError::Timeout { timeout_ms: 2500 });
    }

    #[test]
    fn maps_validation_and_parse() {
        let err = CoreError::from(rgbw2_api::Error::InvalidChannel { channel: 9 });
        assert!(matches!(err, CoreError::Validation { .. }));
        assert!(!err.is_transport());

        let err = CoreError::from(rgbw2_api::Error::Parse {
            message: "expected object".into(),
            body: "[]".into(),
        });
        assert_eq!(
            err,
            CoreError::Parse {
                message: "expected object".into()
            }
        );
    }
}
