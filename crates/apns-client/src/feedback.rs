//! Feedback-service reader.
//!
//! The feedback service streams `{timestamp, token_len, token}` records
//! and then closes. The reader consumes records sequentially to
//! end-of-stream; whatever was parsed before a failure is still returned,
//! so callers can act on the partial batch.

use tokio::io::{AsyncRead, AsyncReadExt};

use apns_core::{FeedbackError, FeedbackResponse, FEEDBACK_HEADER_SIZE};

use crate::tls;

/// The outcome of draining the feedback stream: every record parsed
/// before end-of-stream or failure, plus the failure if there was one.
#[derive(Debug)]
pub struct FeedbackDrain {
    pub responses: Vec<FeedbackResponse>,
    pub error: Option<FeedbackError>,
}

/// Read feedback records until end-of-stream.
///
/// Clean EOF at a record boundary is a normal end. EOF inside a record or
/// any other transport error stops the read and is reported alongside the
/// responses accumulated so far.
pub async fn read_feedback<R: AsyncRead + Unpin>(transport: &mut R) -> FeedbackDrain {
    let mut responses = Vec::new();
    let mut header = [0u8; FEEDBACK_HEADER_SIZE];

    loop {
        match read_header(transport, &mut header).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(records = responses.len(), "feedback stream drained");
                return FeedbackDrain {
                    responses,
                    error: None,
                };
            }
            Err(error) => {
                tracing::warn!(records = responses.len(), error = %error, "feedback read failed");
                return FeedbackDrain {
                    responses,
                    error: Some(error),
                };
            }
        }

        let timestamp = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let token_len = u16::from_be_bytes([header[4], header[5]]) as usize;

        let mut token = vec![0u8; token_len];
        if let Err(err) = transport.read_exact(&mut token).await {
            let error = if err.kind() == std::io::ErrorKind::UnexpectedEof {
                FeedbackError::TruncatedRecord
            } else {
                FeedbackError::Io(err)
            };
            tracing::warn!(records = responses.len(), error = %error, "feedback read failed");
            return FeedbackDrain {
                responses,
                error: Some(error),
            };
        }

        responses.push(FeedbackResponse {
            timestamp,
            token: hex::encode(&token),
        });
    }
}

/// Fill the 6-byte record header. `Ok(false)` is a clean end-of-stream at
/// a record boundary; EOF after a partial header is a truncated record.
async fn read_header<R: AsyncRead + Unpin>(
    transport: &mut R,
    header: &mut [u8; FEEDBACK_HEADER_SIZE],
) -> Result<bool, FeedbackError> {
    let mut filled = 0;
    while filled < header.len() {
        let n = transport.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(FeedbackError::TruncatedRecord);
        }
        filled += n;
    }
    Ok(true)
}

/// Dial the feedback service and drain it.
///
/// Convenience over [`tls::connect_feedback`] + [`read_feedback`].
pub async fn poll_feedback(
    config: &apns_core::FeedbackConfig,
) -> Result<FeedbackDrain, tls::TlsError> {
    let mut stream = tls::connect_feedback(config).await?;
    Ok(read_feedback(&mut stream).await)
}
