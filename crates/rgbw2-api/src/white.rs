// White-channel HTTP client
//
// Wraps `reqwest::Client` with channel validation, query encoding for the
// `/white/{channel}` control endpoint, per-attempt timeouts, linear retry
// backoff, and lenient parsing of the `{ ison, brightness }` status body.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{BasicAuth, TransportConfig};

/// Highest channel index exposed by an RGBW2 in white mode.
pub const MAX_CHANNEL: u8 = 3;

const RETRY_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// On/off state of one white channel as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhiteStatus {
    pub is_on: bool,
    pub brightness: u8,
}

/// Value of the `turn` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Turn {
    On,
    Off,
}

impl From<bool> for Turn {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// The four operations of the white-channel control surface.
///
/// Implemented by [`WhiteClient`]; `rgbw2-core` only depends on this trait
/// so channel controllers can be exercised against an in-memory device.
#[async_trait]
pub trait WhiteChannelApi: Send + Sync {
    async fn get_status(&self, channel: u8) -> Result<WhiteStatus, Error>;

    async fn set_on(
        &self,
        channel: u8,
        on: bool,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error>;

    async fn set_on_with_brightness(
        &self,
        channel: u8,
        brightness: f64,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error>;

    async fn set_brightness(
        &self,
        channel: u8,
        brightness: f64,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error>;
}

/// HTTP client for one Shelly RGBW2 device in white mode.
///
/// Every call is independent: there is no session and no shared state
/// besides the pooled `reqwest::Client`.
pub struct WhiteClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    retries: u32,
    auth: Option<BasicAuth>,
}

impl WhiteClient {
    /// Create a client for `host`.
    ///
    /// `host` may be a bare address (`192.168.1.40`) or a full URL; a value
    /// that does not start with `http` is treated as `http://{host}`.
    pub fn new(host: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let base_url = normalize_host(host)?;
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, transport))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, transport: &TransportConfig) -> Self {
        Self {
            http,
            base_url,
            timeout: transport.timeout,
            retries: transport.retries,
            auth: transport.auth.clone(),
        }
    }

    /// The device base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Read the current state of a channel.
    pub async fn get_status(&self, channel: u8) -> Result<WhiteStatus, Error> {
        let url = self.channel_url(channel)?;
        self.request(url).await
    }

    /// Switch a channel on or off.
    pub async fn set_on(
        &self,
        channel: u8,
        on: bool,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error> {
        self.state_change(channel, Some(Turn::from(on)), None, transition_ms)
            .await
    }

    /// Switch a channel on at the given brightness in a single request.
    pub async fn set_on_with_brightness(
        &self,
        channel: u8,
        brightness: f64,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error> {
        self.state_change(
            channel,
            Some(Turn::On),
            Some(clamp_brightness(brightness)),
            transition_ms,
        )
        .await
    }

    /// Change brightness without touching the on/off state.
    pub async fn set_brightness(
        &self,
        channel: u8,
        brightness: f64,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error> {
        self.state_change(
            channel,
            None,
            Some(clamp_brightness(brightness)),
            transition_ms,
        )
        .await
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/white/{channel}`, rejecting channels above [`MAX_CHANNEL`].
    fn channel_url(&self, channel: u8) -> Result<Url, Error> {
        if channel > MAX_CHANNEL {
            return Err(Error::InvalidChannel { channel });
        }
        Ok(self.base_url.join(&format!("/white/{channel}"))?)
    }

    async fn state_change(
        &self,
        channel: u8,
        turn: Option<Turn>,
        brightness: Option<u8>,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error> {
        let mut url = self.channel_url(channel)?;

        let mut params: Vec<(&str, String)> = Vec::with_capacity(3);
        if let Some(turn) = turn {
            params.push(("turn", turn.to_string()));
        }
        if let Some(brightness) = brightness {
            params.push(("brightness", brightness.to_string()));
        }
        if let Some(ms) = transition_ms {
            params.push(("transition", transition_param(ms).to_string()));
        }
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }

        self.request(url).await
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Run the request with the retry budget, then parse the body.
    ///
    /// Only transport failures are retried; the delay before retry `n`
    /// (1-based) is `100ms * n`.
    async fn request(&self, url: Url) -> Result<WhiteStatus, Error> {
        let mut attempt: u32 = 0;
        let body = loop {
            match self.attempt(&url).await {
                Ok(body) => break body,
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    let backoff = RETRY_BACKOFF_STEP * attempt;
                    debug!(error = %e, attempt, ?backoff, "retrying {}", url);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        };

        parse_body(&body)
    }

    /// A single GET bounded by the per-attempt timeout.
    ///
    /// On timeout the in-flight future is dropped, which aborts the
    /// underlying connection.
    async fn attempt(&self, url: &Url) -> Result<String, Error> {
        debug!("GET {}", url);

        let mut req = self.http.get(url.clone());
        if let Some(ref auth) = self.auth {
            req = req.basic_auth(&auth.username, Some(auth.password.expose_secret()));
        }

        let call = async {
            let resp = req.send().await.map_err(Error::Transport)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(Error::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            resp.text().await.map_err(Error::Transport)
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| Error::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}

#[async_trait]
impl WhiteChannelApi for WhiteClient {
    async fn get_status(&self, channel: u8) -> Result<WhiteStatus, Error> {
        WhiteClient::get_status(self, channel).await
    }

    async fn set_on(
        &self,
        channel: u8,
        on: bool,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error> {
        WhiteClient::set_on(self, channel, on, transition_ms).await
    }

    async fn set_on_with_brightness(
        &self,
        channel: u8,
        brightness: f64,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error> {
        WhiteClient::set_on_with_brightness(self, channel, brightness, transition_ms).await
    }

    async fn set_brightness(
        &self,
        channel: u8,
        brightness: f64,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error> {
        WhiteClient::set_brightness(self, channel, brightness, transition_ms).await
    }
}

// ── Value helpers ────────────────────────────────────────────────────

fn normalize_host(host: &str) -> Result<Url, Error> {
    if host.starts_with("http") {
        Ok(Url::parse(host)?)
    } else {
        Ok(Url::parse(&format!("http://{host}"))?)
    }
}

/// Round and clamp a brightness to `0..=100`. NaN becomes 0.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::as_conversions
)]
pub fn clamp_brightness(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Round a transition duration to whole milliseconds, never negative.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::as_conversions
)]
pub fn transition_param(ms: f64) -> u64 {
    if ms.is_nan() {
        return 0;
    }
    ms.max(0.0).round() as u64
}

fn parse_body(body: &str) -> Result<WhiteStatus, Error> {
    let value: Value = serde_json::from_str(body).map_err(|e| Error::Parse {
        message: e.to_string(),
        body: body.to_owned(),
    })?;
    parse_white_status(&value)
}

/// Parse a `/white/{channel}` response body.
///
/// The body must be a JSON object. `ison` is read with loose truthiness and
/// `brightness` is coerced to a number before clamping; anything
/// non-numeric counts as 0. Unknown fields are ignored.
pub fn parse_white_status(data: &Value) -> Result<WhiteStatus, Error> {
    let Value::Object(record) = data else {
        return Err(Error::Parse {
            message: "expected object".into(),
            body: data.to_string(),
        });
    };

    let is_on = record.get("ison").is_some_and(truthy);
    let brightness = clamp_brightness(coerce_number(record.get("brightness")));

    Ok(WhiteStatus { is_on, brightness })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Null) => 0.0,
        _ => f64::NAN,
    }
}
