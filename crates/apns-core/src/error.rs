//! Error taxonomy.
//!
//! Four failure domains, one enum each: payload serialization
//! ([`PayloadError`]), device-token validation ([`TokenError`]),
//! configuration ([`ConfigError`]), and feedback-stream reads
//! ([`FeedbackError`]). The wire-level diagnosis Apple delivers on its
//! one-way error channel is [`AppleError`].

use core::fmt;

/// Status codes carried in the gateway's 6-byte error reply.
///
/// Codes 0-255 are Apple's. 250 and 251 never appear on the wire: they
/// classify closes observed locally (client disconnect vs. anything else).
pub mod status {
    pub const NO_ERRORS: u8 = 0;
    pub const PROCESSING_ERROR: u8 = 1;
    pub const MISSING_DEVICE_TOKEN: u8 = 2;
    pub const MISSING_TOPIC: u8 = 3;
    pub const MISSING_PAYLOAD: u8 = 4;
    pub const INVALID_TOKEN_SIZE: u8 = 5;
    pub const INVALID_TOPIC_SIZE: u8 = 6;
    pub const INVALID_PAYLOAD_SIZE: u8 = 7;
    pub const INVALID_TOKEN: u8 = 8;
    /// Apple announced an orderly shutdown of the connection.
    pub const SHUTDOWN: u8 = 10;
    /// Undocumented, but observed in production.
    pub const INVALID_FRAME_ITEM_ID: u8 = 128;
    pub const UNKNOWN: u8 = 255;

    /// Local close while a client-initiated disconnect was in progress.
    pub const CONNECTION_CLOSED_DISCONNECT: u8 = 250;
    /// Local close with no disconnect in progress (read/write failure).
    pub const CONNECTION_CLOSED_UNKNOWN: u8 = 251;
}

/// Mnemonic for a reply status code. Unmapped codes read as `UNKNOWN`.
pub fn status_mnemonic(code: u8) -> &'static str {
    match code {
        status::NO_ERRORS => "NO_ERRORS",
        status::PROCESSING_ERROR => "PROCESSING_ERROR",
        status::MISSING_DEVICE_TOKEN => "MISSING_DEVICE_TOKEN",
        status::MISSING_TOPIC => "MISSING_TOPIC",
        status::MISSING_PAYLOAD => "MISSING_PAYLOAD",
        status::INVALID_TOKEN_SIZE => "INVALID_TOKEN_SIZE",
        status::INVALID_TOPIC_SIZE => "INVALID_TOPIC_SIZE",
        status::INVALID_PAYLOAD_SIZE => "INVALID_PAYLOAD_SIZE",
        status::INVALID_TOKEN => "INVALID_TOKEN",
        status::SHUTDOWN => "SHUTDOWN",
        status::INVALID_FRAME_ITEM_ID => "INVALID_FRAME_ITEM_ID",
        status::CONNECTION_CLOSED_DISCONNECT => "CONNECTION_CLOSED_DISCONNECT",
        status::CONNECTION_CLOSED_UNKNOWN => "CONNECTION_CLOSED_UNKNOWN",
        _ => "UNKNOWN",
    }
}

/// The terminal diagnosis for a connection.
///
/// `message_id` is 0 when no specific notification is implicated (socket
/// failure, malformed reply); otherwise it names the offender and drives
/// the replay-buffer correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppleError {
    pub error_code: u8,
    pub error_string: &'static str,
    pub message_id: u32,
}

impl AppleError {
    /// Build from a parsed reply status and message id.
    pub fn from_status(code: u8, message_id: u32) -> Self {
        Self {
            error_code: code,
            error_string: status_mnemonic(code),
            message_id,
        }
    }

    /// Local close while a disconnect was in progress.
    pub fn closed_disconnect() -> Self {
        Self::from_status(status::CONNECTION_CLOSED_DISCONNECT, 0)
    }

    /// Local close with no disconnect in progress.
    pub fn closed_unknown() -> Self {
        Self::from_status(status::CONNECTION_CLOSED_UNKNOWN, 0)
    }

    /// True when the close was requested by this client.
    pub fn is_clean_disconnect(&self) -> bool {
        self.error_code == status::CONNECTION_CLOSED_DISCONNECT
    }
}

impl fmt::Display for AppleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (code {}, message {})",
            self.error_string, self.error_code, self.message_id
        )
    }
}

impl std::error::Error for AppleError {}

/// Payload serialization errors.
#[derive(Debug)]
pub enum PayloadError {
    /// A custom field used the reserved top-level key `"aps"`.
    ReservedKey,
    /// The payload cannot fit `limit` bytes even with the alert truncated.
    TooLarge { limit: usize },
    Json(serde_json::Error),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedKey => write!(f, "custom field named \"aps\" is reserved"),
            Self::TooLarge { limit } => {
                write!(f, "payload too large to serialize under {limit} bytes")
            }
            Self::Json(e) => write!(f, "JSON serialization failed: {e}"),
        }
    }
}

impl std::error::Error for PayloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PayloadError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Device-token validation errors.
#[derive(Debug)]
pub enum TokenError {
    Hex(hex::FromHexError),
    /// Decoded length differed from the required 32 bytes.
    Length { len: usize },
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hex(e) => write!(f, "token is not valid hex: {e}"),
            Self::Length { len } => {
                write!(f, "token decoded to {len} bytes, expected 32")
            }
        }
    }
}

impl std::error::Error for TokenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Hex(e) => Some(e),
            Self::Length { .. } => None,
        }
    }
}

impl From<hex::FromHexError> for TokenError {
    fn from(e: hex::FromHexError) -> Self {
        Self::Hex(e)
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroBufferSize,
    /// Outbound frame size must be in `1..=65535`.
    FrameSize { size: usize },
    ZeroPayloadSize,
    MissingCredentials,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroBufferSize => {
                write!(f, "in-flight payload buffer size must be greater than 0")
            }
            Self::FrameSize { size } => {
                write!(f, "outbound frame size {size} is outside 1..=65535")
            }
            Self::ZeroPayloadSize => write!(f, "max payload size must be greater than 0"),
            Self::MissingCredentials => write!(f, "certificate and key bytes are required"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Feedback-stream read errors.
///
/// Responses accumulated before the failure are still returned alongside
/// the error; see `FeedbackDrain` in the client crate.
#[derive(Debug)]
pub enum FeedbackError {
    Io(std::io::Error),
    /// The stream ended inside a record.
    TruncatedRecord,
}

impl fmt::Display for FeedbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "feedback read failed: {e}"),
            Self::TruncatedRecord => write!(f, "feedback stream ended mid-record"),
        }
    }
}

impl std::error::Error for FeedbackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::TruncatedRecord => None,
        }
    }
}

impl From<std::io::Error> for FeedbackError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
