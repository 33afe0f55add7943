//! phpIPAM connection management and the shared request path.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use netledger_core::InventoryError;

/// Timestamp layout phpIPAM expects for `lastSeen`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Configuration for talking to a phpIPAM instance.
///
/// Loaded from the `[ipam]` section of `netledger.toml` or
/// `NETLEDGER_IPAM__` environment variables.
#[derive(Clone, Deserialize)]
pub struct IpamConfig {
    /// Server root, e.g. `https://ipam.example.net`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API application id configured in phpIPAM.
    #[serde(default)]
    pub app_id: String,

    /// Static app code token sent in the `token` header.
    #[serde(default)]
    pub token: String,

    /// Section new subnets are created in.
    #[serde(default = "default_section_id")]
    pub section_id: String,

    /// Whether to verify the server certificate.
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Custom address field that holds the NIC vendor.
    #[serde(default = "default_vendor_field")]
    pub vendor_field: String,
}

impl fmt::Debug for IpamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpamConfig")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("token", &"[REDACTED]")
            .field("section_id", &self.section_id)
            .field("verify_tls", &self.verify_tls)
            .field("timeout_secs", &self.timeout_secs)
            .field("vendor_field", &self.vendor_field)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://localhost".to_string()
}

fn default_section_id() -> String {
    "1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_vendor_field() -> String {
    "custom_Manufacturer".to_string()
}

impl Default for IpamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            app_id: String::new(),
            token: String::new(),
            section_id: default_section_id(),
            verify_tls: true,
            timeout_secs: default_timeout_secs(),
            vendor_field: default_vendor_field(),
        }
    }
}

/// The `{code, success, message, data, id}` wrapper phpIPAM puts around
/// every response.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Envelope {
    pub code: Option<u16>,
    pub message: Option<String>,
    pub data: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// phpIPAM REST client. Clone is cheap (inner connection pool is shared).
#[derive(Clone)]
pub struct IpamClient {
    http: Client,
    api_root: String,
    pub(crate) section_id: String,
    pub(crate) vendor_field: String,
}

impl IpamClient {
    pub fn new(config: &IpamConfig) -> Result<Self, InventoryError> {
        if config.app_id.is_empty() {
            return Err(InventoryError::Config("ipam.app_id is not set".into()));
        }
        if config.token.is_empty() {
            return Err(InventoryError::Config("ipam.token is not set".into()));
        }

        if !config.verify_tls {
            tracing::warn!(
                base_url = %config.base_url,
                "TLS certificate verification disabled for phpIPAM"
            );
        }

        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(&config.token)
            .map_err(|e| InventoryError::Config(format!("invalid token header: {e}")))?;
        headers.insert("token", token);

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_tls)
            .default_headers(headers)
            .build()
            .map_err(|e| InventoryError::Config(e.to_string()))?;

        let api_root = format!(
            "{}/api/{}/",
            config.base_url.trim_end_matches('/'),
            config.app_id.trim_matches('/')
        );

        tracing::debug!(api_root = %api_root, "phpIPAM client ready");

        Ok(Self {
            http,
            api_root,
            section_id: config.section_id.clone(),
            vendor_field: config.vendor_field.clone(),
        })
    }

    /// Resolve a controller path such as `subnets/` against the API root.
    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path.trim_start_matches('/'))
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Send a request and unwrap the phpIPAM envelope, mapping failure codes
    /// onto [`InventoryError`].
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Envelope, InventoryError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InventoryError::Timeout(e.to_string())
            } else {
                InventoryError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InventoryError::Transport(e.to_string()))?;

        interpret_response(status, &body)
    }
}

/// Decide what a phpIPAM response means. The envelope `code` wins over the
/// HTTP status when both are present.
pub(crate) fn interpret_response(
    status: StatusCode,
    body: &str,
) -> Result<Envelope, InventoryError> {
    let envelope = match serde_json::from_str::<Envelope>(body) {
        Ok(env) => env,
        Err(_) if !status.is_success() => Envelope::default(),
        Err(e) => {
            return Err(InventoryError::InvalidResponse(format!(
                "status {status}: {e} - body: {}",
                truncate(body)
            )))
        }
    };

    let code = envelope.code.unwrap_or(status.as_u16());
    let message = envelope
        .message
        .clone()
        .unwrap_or_else(|| truncate(body));

    match code {
        200..=299 => Ok(envelope),
        404 => Err(InventoryError::NotFound(message)),
        409 => Err(InventoryError::Conflict(message)),
        _ => Err(InventoryError::Rejected {
            status: code,
            message,
        }),
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(500).collect()
}

/// Render a timestamp in phpIPAM's `YYYY-MM-DD HH:MM:SS` layout.
pub fn format_timestamp<Tz>(ts: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    ts.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string()
}

/// Timestamps are written in the server's local time, matching what the
/// phpIPAM web UI shows.
pub(crate) fn format_local(ts: &DateTime<Utc>) -> String {
    format_timestamp(ts, &Local)
}

/// Parse a `lastSeen` value written by phpIPAM. The all-zero placeholder
/// and anything unparseable become `None`.
pub(crate) fn parse_local(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
