//! apns-client: async client for Apple's legacy binary push gateway and
//! feedback service.
//!
//! # Sending
//!
//! ```ignore
//! let mut connection = Connection::dial(config).await?;
//! let sender = connection.sender();
//!
//! loop {
//!     tokio::select! {
//!         res = sender.send(next_payload()) => res?,
//!         Some(close) = connection.closed() => {
//!             // close.error_payload / close.unsent_payloads name what to
//!             // resubmit on a fresh connection.
//!             break;
//!         }
//!     }
//! }
//! ```
//!
//! The gateway acknowledges nothing on success; its only reply names one
//! offending message, after which everything newer was discarded. The
//! connection tracks recent submissions and folds that reply into a
//! single terminal [`ConnectionClose`].
//!
//! # Feedback
//!
//! ```ignore
//! let drain = poll_feedback(&feedback_config).await?;
//! for retired in drain.responses {
//!     forget_device(&retired.token);
//! }
//! ```

mod connection;
mod feedback;
pub mod tls;

pub use apns_core::*;
pub use connection::{Connection, PayloadSender, SendError};
pub use feedback::{poll_feedback, read_feedback, FeedbackDrain};
pub use tls::TlsError;
