//! Session handles and their configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// Default OVSDB socket on a local host.
pub const DEFAULT_ENDPOINT: &str = "unix:/var/run/openvswitch/db.sock";

const KNOWN_SCHEMES: [&str; 3] = ["unix:", "tcp:", "ssl:"];

/// TLS material for `ssl:` endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsCredentials {
    /// Path to the client private key
    pub private_key: String,
    /// Path to the client certificate
    pub certificate: String,
    /// Path to the CA certificate used to verify the server
    pub ca_cert: String,
}

/// Settings used to open a session with a host's management endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Management endpoint (`unix:<path>`, `tcp:<host>:<port>` or `ssl:<host>:<port>`)
    pub endpoint: String,
    /// Client credentials, required for `ssl:` endpoints
    pub tls: Option<TlsCredentials>,
    /// How many times a transient failure is retried
    pub retry_count: u32,
    /// Pause between retries in seconds
    pub retry_interval_secs: u64,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            tls: None,
            retry_count: 10,
            retry_interval_secs: 2,
            timeout_secs: 30,
        }
    }
}

impl SessionConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_tls(mut self, tls: TlsCredentials) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Check that the endpoint and credentials are usable.
    pub fn validate(&self) -> Result<(), SessionError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(invalid("endpoint", "must not be empty"));
        }

        if !KNOWN_SCHEMES.iter().any(|scheme| endpoint.starts_with(scheme)) {
            return Err(invalid(
                "endpoint",
                &format!("must start with one of {:?}", KNOWN_SCHEMES),
            ));
        }

        if endpoint.starts_with("ssl:") {
            let tls = self.tls.as_ref().ok_or_else(|| {
                invalid("tls", "ssl endpoints require private_key, certificate and ca_cert")
            })?;
            for (field, value) in [
                ("tls.private_key", &tls.private_key),
                ("tls.certificate", &tls.certificate),
                ("tls.ca_cert", &tls.ca_cert),
            ] {
                if value.trim().is_empty() {
                    return Err(invalid(field, "must not be empty"));
                }
            }
        }

        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> SessionError {
    SessionError::InvalidConfig {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// An authenticated handle to one host's management endpoint.
///
/// The reconciler treats it as opaque and only passes it through to the
/// capabilities, which read the connection parameters they need.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    endpoint: String,
    tls: Option<TlsCredentials>,
    retry_count: u32,
    retry_interval: Duration,
    timeout: Duration,
    opened_at: DateTime<Utc>,
}

impl Session {
    /// Create a handle from already validated settings.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint: config.endpoint.trim().to_string(),
            tls: config.tls.clone(),
            retry_count: config.retry_count,
            retry_interval: Duration::from_secs(config.retry_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn tls(&self) -> Option<&TlsCredentials> {
        self.tls.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Whether the endpoint is a socket on this machine.
    pub fn is_local(&self) -> bool {
        self.endpoint.starts_with("unix:")
    }
}
