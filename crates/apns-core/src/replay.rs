//! Bounded replay history and terminal error correlation.
//!
//! The gateway never acknowledges success; its only reply names one
//! offending message id, and everything written after that message was
//! silently discarded. The connection keeps the most recent submissions
//! here so the terminal phase can recover the offending payload and the
//! unsent tail.

use std::collections::VecDeque;

use crate::error::AppleError;
use crate::payload::Payload;

/// A payload paired with its per-connection message id.
#[derive(Debug, Clone)]
pub struct IdPayload {
    pub id: u32,
    pub payload: Payload,
}

/// Bounded FIFO of recent submissions, newest at the front. When full,
/// the oldest entry is evicted.
#[derive(Debug)]
pub struct ReplayBuffer {
    entries: VecDeque<IdPayload>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Record a submission, evicting the eldest entry on overflow.
    pub fn push(&mut self, id: u32, payload: Payload) {
        self.entries.push_front(IdPayload { id, payload });
        if self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the terminal diagnosis against the retained history.
    ///
    /// Runs once, after the send loop has exited; the buffer is consumed.
    ///
    /// - A client-initiated disconnect closes cleanly: no error, nothing
    ///   unsent.
    /// - A diagnosis without a message id (local close, `NO_ERRORS`)
    ///   implicates nothing.
    /// - Otherwise the history is walked newest-first until the offender;
    ///   everything newer is the unsent tail, reported oldest-first. If
    ///   the offender was already evicted, the whole history is unsent
    ///   and `unsent_buffer_overflow` is set.
    pub fn correlate(mut self, error: AppleError) -> ConnectionClose {
        if error.is_clean_disconnect() {
            return ConnectionClose::default();
        }

        let mut unsent_payloads = Vec::new();
        let mut error_payload = None;
        if error.error_code != 0 && error.message_id != 0 {
            for entry in self.entries.drain(..) {
                if entry.id == error.message_id {
                    error_payload = Some(entry.payload);
                    break;
                }
                unsent_payloads.push(entry.payload);
            }
            // Collected newest-first; report in original send order.
            unsent_payloads.reverse();
        }

        let unsent_buffer_overflow = !unsent_payloads.is_empty() && error_payload.is_none();
        ConnectionClose {
            error: Some(error),
            error_payload,
            unsent_payloads,
            unsent_buffer_overflow,
        }
    }
}

/// The one terminal result a connection delivers.
#[derive(Debug, Default)]
pub struct ConnectionClose {
    /// The diagnosis, absent for a clean client-initiated shutdown.
    pub error: Option<AppleError>,
    /// The payload the gateway identified as offending, when it was still
    /// in the replay history.
    pub error_payload: Option<Payload>,
    /// Payloads written after the offender and discarded by the gateway,
    /// in original send order.
    pub unsent_payloads: Vec<Payload>,
    /// True when payloads were lost but the offender itself had already
    /// been evicted from the replay history.
    pub unsent_buffer_overflow: bool,
}
