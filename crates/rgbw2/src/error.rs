//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use rgbw2_config::ConfigError;
use rgbw2_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const DEVICE: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach device at {url}")]
    #[diagnostic(
        code(rgbw2::connection_failed),
        help(
            "Check that the device is powered and reachable on the network.\n\
             Try: rgbw2 status -v"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Device request timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(rgbw2::timeout),
        help("Raise request_timeout_ms in the config or check the device's Wi-Fi signal.")
    )]
    Timeout { timeout_ms: u64 },

    // ── Device ───────────────────────────────────────────────────────
    #[error("Device rejected the credentials for {url}")]
    #[diagnostic(
        code(rgbw2::auth_failed),
        help(
            "Set username and password_env for the device, or store the password\n\
             in the system keyring under service 'rgbw2', entry '<device>/password'."
        )
    )]
    AuthFailed { url: String },

    #[error("Device answered HTTP {status} for {url}")]
    #[diagnostic(code(rgbw2::device_error))]
    DeviceError { status: u16, url: String },

    #[error("Invalid device response: {message}")]
    #[diagnostic(
        code(rgbw2::invalid_response),
        help("Make sure the device runs in white mode.")
    )]
    InvalidResponse { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(rgbw2::not_found),
        help("Run: rgbw2 {list_command} to see what is configured")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(rgbw2::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No devices configured")]
    #[diagnostic(
        code(rgbw2::no_devices),
        help("Add a [[devices]] entry to the config file.\nExpected at: {path}")
    )]
    NoDevices { path: String },

    #[error(transparent)]
    #[diagnostic(code(rgbw2::config), help("Inspect the loaded settings with: rgbw2 config show"))]
    Config(#[from] ConfigError),

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Channel controller stopped before the request completed")]
    #[diagnostic(code(rgbw2::stopped))]
    Stopped,

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(rgbw2::json), help("Check the state file contents or remove it."))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render TOML: {0}")]
    #[diagnostic(code(rgbw2::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::DeviceError { .. } | Self::InvalidResponse { .. } => exit_code::DEVICE,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },

            CoreError::Timeout { timeout_ms } => CliError::Timeout { timeout_ms },

            CoreError::Http {
                status: 401 | 403,
                url,
            } => CliError::AuthFailed { url },

            CoreError::Http { status, url } => CliError::DeviceError { status, url },

            CoreError::Parse { message } => CliError::InvalidResponse { message },

            CoreError::ChannelNotFound { key } => CliError::NotFound {
                resource_type: "channel".into(),
                identifier: key,
                list_command: "status".into(),
            },

            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::ControllerStopped => CliError::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::Timeout { timeout_ms: 2500 },
                exit_code::TIMEOUT,
            ),
            (
                CoreError::Http {
                    status: 401,
                    url: "http://10.0.0.5/white/0".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::Http {
                    status: 500,
                    url: "http://10.0.0.5/white/0".into(),
                },
                exit_code::DEVICE,
            ),
            (
                CoreError::ChannelNotFound {
                    key: "kitchen:ch3".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::ConnectionFailed {
                    url: "http://10.0.0.5/white/0".into(),
                    reason: "refused".into(),
                },
                exit_code::CONNECTION,
            ),
            (CoreError::ControllerStopped, exit_code::GENERAL),
        ];

        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }
}
