//! apns-core: types and codecs for Apple's legacy binary push protocol.
//!
//! This crate holds the synchronous leaves of the client:
//! - the notification data model and bounded JSON serializer ([`Payload`])
//! - the v2 "enhanced" frame codec ([`frame`])
//! - the bounded replay history and close correlation ([`ReplayBuffer`],
//!   [`ConnectionClose`])
//! - configuration ([`ApnsConfig`], [`FeedbackConfig`])
//! - the error taxonomy ([`AppleError`] and friends)
//!
//! The async connection itself lives in `apns-client`.

mod config;
mod error;
mod feedback;
pub mod frame;
mod payload;
mod replay;

pub use config::*;
pub use error::*;
pub use feedback::*;
pub use frame::{decode_token, ERROR_REPLY_SIZE, NOTIFICATION_HEADER_SIZE, TCP_FRAME_MAX, TOKEN_SIZE};
pub use payload::*;
pub use replay::*;
