// Shared transport configuration for building reqwest::Client instances.
//
// Timeout and retry budget live here rather than on the reqwest client:
// the per-attempt timeout is enforced by `WhiteClient` itself so a slow
// attempt can be dropped without giving up on the whole request.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2500);
pub const DEFAULT_RETRIES: u32 = 1;

/// Basic-auth credentials for a device.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: SecretString,
}

impl BasicAuth {
    /// Build credentials only when both halves are present and non-empty.
    pub fn from_parts(username: Option<String>, password: Option<SecretString>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password))
                if !username.is_empty() && !password.expose_secret().is_empty() =>
            {
                Some(Self { username, password })
            }
            _ => None,
        }
    }
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Extra attempts after the first one fails with a transport error.
    pub retries: u32,
    pub auth: Option<BasicAuth>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            auth: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .user_agent(concat!("rgbw2/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::error::Error::Client(e.to_string()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_auth(mut self, auth: Option<BasicAuth>) -> Self {
        self.auth = auth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_requires_both_parts() {
        assert!(BasicAuth::from_parts(Some("admin".into()), None).is_none());
        assert!(BasicAuth::from_parts(None, Some(SecretString::from("pw"))).is_none());
        assert!(
            BasicAuth::from_parts(Some("admin".into()), Some(SecretString::from(""))).is_none()
        );
        let auth = BasicAuth::from_parts(Some("admin".into()), Some(SecretString::from("pw")));
        assert_eq!(auth.map(|a| a.username).as_deref(), Some("admin"));
    }

    #[test]
    fn defaults() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.timeout, Duration::from_millis(2500));
        assert_eq!(cfg.retries, 1);
        assert!(cfg.auth.is_none());
    }
}
