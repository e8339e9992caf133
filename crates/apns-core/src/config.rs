//! Connection and feedback-service configuration.

use std::time::Duration;

use crate::error::ConfigError;
use crate::frame::TCP_FRAME_MAX;

/// Default replay history depth.
pub const DEFAULT_IN_FLIGHT_PAYLOAD_BUFFER_SIZE: usize = 10_000;
/// Default framing timeout between a submission and its flush.
pub const DEFAULT_FRAMING_TIMEOUT: Duration = Duration::from_millis(10);
/// Default upper bound on serialized payload JSON. Historically 256.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 2048;
/// Default push gateway endpoint.
pub const DEFAULT_GATEWAY_HOST: &str = "gateway.push.apple.com";
pub const DEFAULT_GATEWAY_PORT: u16 = 2195;
/// Default feedback-service endpoint.
pub const DEFAULT_FEEDBACK_HOST: &str = "feedback.push.apple.com";
pub const DEFAULT_FEEDBACK_PORT: u16 = 2196;
/// Default TLS handshake timeout.
pub const DEFAULT_TLS_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a push-gateway connection.
///
/// The host, port, timeout, and credential fields only matter to the TLS
/// connector; a connection opened over a caller-supplied stream ignores
/// them.
#[derive(Debug, Clone)]
pub struct ApnsConfig {
    /// Number of recent submissions retained for error correlation.
    pub in_flight_payload_buffer_size: usize,
    /// How long a buffered notification may wait before a flush.
    /// `None` flushes every submission immediately.
    pub framing_timeout: Option<Duration>,
    /// Upper bound on serialized payload JSON.
    pub max_payload_size: usize,
    /// Flush threshold for the accumulated outbound frame bytes.
    pub max_outbound_frame_size: usize,
    pub gateway_host: String,
    pub gateway_port: u16,
    /// TCP connect timeout; `None` waits indefinitely.
    pub socket_timeout: Option<Duration>,
    /// TLS handshake timeout.
    pub tls_timeout: Duration,
    /// PEM-encoded client certificate chain.
    pub certificate_pem: Vec<u8>,
    /// PEM-encoded private key.
    pub key_pem: Vec<u8>,
}

impl Default for ApnsConfig {
    fn default() -> Self {
        Self {
            in_flight_payload_buffer_size: DEFAULT_IN_FLIGHT_PAYLOAD_BUFFER_SIZE,
            framing_timeout: Some(DEFAULT_FRAMING_TIMEOUT),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_outbound_frame_size: TCP_FRAME_MAX,
            gateway_host: DEFAULT_GATEWAY_HOST.to_string(),
            gateway_port: DEFAULT_GATEWAY_PORT,
            socket_timeout: None,
            tls_timeout: DEFAULT_TLS_TIMEOUT,
            certificate_pem: Vec::new(),
            key_pem: Vec::new(),
        }
    }
}

impl ApnsConfig {
    /// Check the options the connection core depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.in_flight_payload_buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.max_outbound_frame_size == 0 || self.max_outbound_frame_size > TCP_FRAME_MAX {
            return Err(ConfigError::FrameSize {
                size: self.max_outbound_frame_size,
            });
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::ZeroPayloadSize);
        }
        Ok(())
    }

    /// Check the credential material the TLS connector depends on.
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        if self.certificate_pem.is_empty() || self.key_pem.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(())
    }
}

/// Configuration for a feedback-service read.
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    pub gateway_host: String,
    pub gateway_port: u16,
    pub socket_timeout: Duration,
    pub tls_timeout: Duration,
    /// PEM-encoded client certificate chain.
    pub certificate_pem: Vec<u8>,
    /// PEM-encoded private key.
    pub key_pem: Vec<u8>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            gateway_host: DEFAULT_FEEDBACK_HOST.to_string(),
            gateway_port: DEFAULT_FEEDBACK_PORT,
            socket_timeout: Duration::from_secs(5),
            tls_timeout: DEFAULT_TLS_TIMEOUT,
            certificate_pem: Vec::new(),
            key_pem: Vec::new(),
        }
    }
}

impl FeedbackConfig {
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        if self.certificate_pem.is_empty() || self.key_pem.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(())
    }
}
