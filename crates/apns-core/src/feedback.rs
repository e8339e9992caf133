//! Feedback-service record types.

/// Size of a feedback record header: 4-byte timestamp + 2-byte token
/// length, both big-endian.
pub const FEEDBACK_HEADER_SIZE: usize = 6;

/// One retired device token from the feedback service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackResponse {
    /// Seconds since the epoch when Apple determined the app was gone
    /// from the device.
    pub timestamp: u32,
    /// Device token, hex-encoded.
    pub token: String,
}
