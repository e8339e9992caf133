//! The gateway connection: batching writer, one-shot reader, terminal
//! correlation.
//!
//! # Architecture
//!
//! ```text
//!   caller ──send──▶ writer task ──frames──▶ transport (write half)
//!                      │    ▲
//!                      │    │ oneshot error report
//!                      ▼    │
//!                 replay buffer        reader task ◀── transport (read half)
//!                      │
//!                      ▼ (after the loop exits)
//!                 ConnectionClose ──▶ caller
//! ```
//!
//! The protocol is pipelined and one-way: the gateway never acknowledges
//! success, and on failure it sends a single 6-byte reply naming the
//! offending message id, then drops the connection. The writer batches
//! frames behind a framing timer; the reader blocks on that single reply.
//! Whichever way the connection ends, the writer runs exactly one
//! correlation pass over the replay buffer and delivers exactly one
//! [`ConnectionClose`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, Notify};
use tokio::time::{sleep, Instant};

use apns_core::frame::{self, ERROR_REPLY_SIZE, NOTIFICATION_HEADER_SIZE};
use apns_core::{
    status, ApnsConfig, AppleError, ConfigError, ConnectionClose, Payload, ReplayBuffer,
    TokenError,
};

/// Liveness flush interval; a safety net, not a delivery guarantee.
const LONG_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

/// Outbound state: the write half plus the accumulated frame bytes.
/// One lock covers both so `disconnect` can flush from the caller's task
/// while the writer task is appending.
struct Outbound<S> {
    writer: WriteHalf<S>,
    frame: BytesMut,
    /// Set after a write failure or shutdown; flushes become no-ops.
    dead: bool,
}

impl<S: AsyncRead + AsyncWrite> Outbound<S> {
    /// Write the accumulated frame bytes in one transport write.
    async fn flush(&mut self) -> std::io::Result<()> {
        if self.dead || self.frame.is_empty() {
            return Ok(());
        }
        let bytes = self.frame.split();
        if let Err(err) = self.writer.write_all(&bytes).await {
            self.dead = true;
            return Err(err);
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.dead = true;
        let _ = self.writer.shutdown().await;
    }
}

struct Shared<S> {
    outbound: AsyncMutex<Outbound<S>>,
    /// Observed by the reader when classifying a close: 250 when a
    /// client-initiated disconnect is in progress, 251 otherwise.
    disconnecting: Mutex<bool>,
    /// Wakes the reader out of its blocking read on shutdown.
    reader_wake: Notify,
}

impl<S> Shared<S> {
    fn closed_error(&self) -> AppleError {
        if *self.disconnecting.lock() {
            AppleError::closed_disconnect()
        } else {
            AppleError::closed_unknown()
        }
    }
}

/// Error returned when submitting to a connection that has already
/// terminated. The payload is handed back for resubmission elsewhere.
#[derive(Debug)]
pub struct SendError(pub Payload);

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection is closed")
    }
}

impl std::error::Error for SendError {}

/// Clonable submission handle.
///
/// The documented caller pattern is a `tokio::select!` between
/// `sender.send(next)` and `connection.closed()`.
#[derive(Clone)]
pub struct PayloadSender {
    tx: mpsc::Sender<Payload>,
}

impl PayloadSender {
    /// Submit one payload. Waits while the writer is busy; fails only
    /// when the connection has terminated.
    pub async fn send(&self, payload: Payload) -> Result<(), SendError> {
        self.tx.send(payload).await.map_err(|e| SendError(e.0))
    }
}

/// A live connection to the push gateway.
///
/// Constructed over any already-open bidirectional byte stream (a TLS
/// socket in production, a duplex pipe in tests). Spawns the writer and
/// reader tasks immediately.
pub struct Connection<S> {
    sender: PayloadSender,
    close_rx: mpsc::Receiver<ConnectionClose>,
    shared: Arc<Shared<S>>,
}

impl<S: AsyncRead + AsyncWrite + Send + 'static> Connection<S> {
    /// Start a connection over `stream`.
    pub fn open(stream: S, config: ApnsConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Arc::new(Shared {
            outbound: AsyncMutex::new(Outbound {
                writer: write_half,
                frame: BytesMut::new(),
                dead: false,
            }),
            disconnecting: Mutex::new(false),
            reader_wake: Notify::new(),
        });

        let (send_tx, send_rx) = mpsc::channel(1);
        let (close_tx, close_rx) = mpsc::channel(1);
        let (err_tx, err_rx) = oneshot::channel();

        tokio::spawn(run_reader(read_half, Arc::clone(&shared), err_tx));
        tokio::spawn(run_writer(
            send_rx,
            err_rx,
            close_tx,
            Arc::clone(&shared),
            config,
        ));

        tracing::debug!("gateway connection started");
        Ok(Self {
            sender: PayloadSender { tx: send_tx },
            close_rx,
            shared,
        })
    }

    /// A clonable submission handle.
    pub fn sender(&self) -> PayloadSender {
        self.sender.clone()
    }

    /// Wait for the terminal [`ConnectionClose`]. Yields exactly one
    /// value over the life of the connection, then `None`.
    pub async fn closed(&mut self) -> Option<ConnectionClose> {
        self.close_rx.recv().await
    }

    /// Graceful shutdown: flush whatever is buffered, close the
    /// transport, and let the terminal close (with no error) drain
    /// through [`Connection::closed`].
    pub async fn disconnect(&self) {
        *self.shared.disconnecting.lock() = true;
        let mut out = self.shared.outbound.lock().await;
        if let Err(err) = out.flush().await {
            tracing::warn!(error = %err, "flush on disconnect failed");
        }
        out.close().await;
        drop(out);
        self.shared.reader_wake.notify_one();
        tracing::debug!("disconnect requested");
    }
}

impl Connection<tokio_rustls::client::TlsStream<tokio::net::TcpStream>> {
    /// Dial the configured gateway over TLS and start the connection.
    pub async fn dial(config: ApnsConfig) -> Result<Self, crate::tls::TlsError> {
        config.validate().map_err(crate::tls::TlsError::Config)?;
        let stream = crate::tls::connect_gateway(&config).await?;
        Self::open(stream, config).map_err(crate::tls::TlsError::Config)
    }
}

/// Strictly increasing message ids; 0 is the null id and is skipped on
/// wrap.
fn next_payload_id(current: u32) -> u32 {
    let next = current.wrapping_add(1);
    if next == 0 {
        1
    } else {
        next
    }
}

/// Reader task: one blocking read for the gateway's single reply, racing
/// the shutdown wake-up. Always reports exactly one [`AppleError`].
async fn run_reader<S: AsyncRead + AsyncWrite + Send + 'static>(
    mut read_half: ReadHalf<S>,
    shared: Arc<Shared<S>>,
    err_tx: oneshot::Sender<AppleError>,
) {
    let mut reply = [0u8; ERROR_REPLY_SIZE];
    let error = tokio::select! {
        res = read_half.read(&mut reply) => match res {
            Ok(0) => shared.closed_error(),
            Ok(n) if n < ERROR_REPLY_SIZE => {
                tracing::warn!(bytes = n, "short reply from gateway");
                let parsed = frame::decode_error_reply(&reply[..n]);
                AppleError::from_status(parsed.status, parsed.message_id)
            }
            Ok(_) => {
                let parsed = frame::decode_error_reply(&reply);
                let error = AppleError::from_status(parsed.status, parsed.message_id);
                tracing::debug!(
                    code = error.error_code,
                    mnemonic = error.error_string,
                    message_id = error.message_id,
                    "gateway error reply"
                );
                error
            }
            Err(err) => {
                tracing::debug!(error = %err, "gateway read failed");
                shared.closed_error()
            }
        },
        () = shared.reader_wake.notified() => shared.closed_error(),
    };
    let _ = err_tx.send(error);
}

/// Writer task: services submissions and the framing timer until a
/// terminal error arrives, then correlates and emits the one close.
async fn run_writer<S: AsyncRead + AsyncWrite + Send + 'static>(
    mut submissions: mpsc::Receiver<Payload>,
    mut reader_err: oneshot::Receiver<AppleError>,
    close_tx: mpsc::Sender<ConnectionClose>,
    shared: Arc<Shared<S>>,
    config: ApnsConfig,
) {
    let mut replay = ReplayBuffer::new(config.in_flight_payload_buffer_size);
    let mut scratch = BytesMut::new();
    let mut id_counter: u32 = 0;

    let timer = sleep(LONG_FLUSH_INTERVAL);
    tokio::pin!(timer);

    let terminal = loop {
        tokio::select! {
            maybe = submissions.recv() => {
                let Some(payload) = maybe else {
                    // Every handle is gone; nobody can observe a close.
                    tracing::debug!("all senders dropped; closing connection");
                    *shared.disconnecting.lock() = true;
                    let mut out = shared.outbound.lock().await;
                    let _ = out.flush().await;
                    out.close().await;
                    drop(out);
                    shared.reader_wake.notify_one();
                    return;
                };

                id_counter = next_payload_id(id_counter);
                let id = id_counter;
                replay.push(id, payload.clone());

                if let Err(local) =
                    buffer_notification(&shared, &config, &mut scratch, &payload, id).await
                {
                    break local;
                }

                match config.framing_timeout {
                    Some(short) => timer.as_mut().reset(Instant::now() + short),
                    None => {
                        // TCP_NODELAY semantics: every submission flushes.
                        flush_outbound(&shared).await;
                        timer.as_mut().reset(Instant::now() + LONG_FLUSH_INTERVAL);
                    }
                }
            }
            () = &mut timer => {
                flush_outbound(&shared).await;
                timer.as_mut().reset(Instant::now() + LONG_FLUSH_INTERVAL);
            }
            res = &mut reader_err => {
                break res.unwrap_or_else(|_| AppleError::closed_unknown());
            }
        }
    };

    // Terminal phase. Refuse further submissions, best-effort flush,
    // close the transport, make sure the reader is not left blocked, then
    // correlate and emit the one ConnectionClose.
    submissions.close();
    {
        let mut out = shared.outbound.lock().await;
        let _ = out.flush().await;
        out.close().await;
    }
    shared.reader_wake.notify_one();

    let close = replay.correlate(terminal);
    tracing::debug!(
        error = ?close.error,
        unsent = close.unsent_payloads.len(),
        overflow = close.unsent_buffer_overflow,
        "connection closed"
    );
    let _ = close_tx.send(close).await;
}

/// Serialize, validate, and append one notification to the outbound
/// frame buffer, flushing first when the frame would overflow.
///
/// A validation failure is fatal to the connection: the returned
/// [`AppleError`] carries the matching Apple status and the offending id,
/// so the standard correlation pass identifies the payload.
async fn buffer_notification<S: AsyncRead + AsyncWrite>(
    shared: &Shared<S>,
    config: &ApnsConfig,
    scratch: &mut BytesMut,
    payload: &Payload,
    id: u32,
) -> Result<(), AppleError> {
    let json = match payload.to_json(config.max_payload_size) {
        Ok(json) => json,
        Err(err) => {
            tracing::warn!(id, error = %err, "payload rejected; closing connection");
            return Err(AppleError::from_status(status::INVALID_PAYLOAD_SIZE, id));
        }
    };

    let token = match frame::decode_token(&payload.token) {
        Ok(token) => token,
        Err(err) => {
            tracing::warn!(id, error = %err, "invalid device token; closing connection");
            let code = match err {
                TokenError::Hex(_) => status::INVALID_TOKEN,
                TokenError::Length { .. } => status::INVALID_TOKEN_SIZE,
            };
            return Err(AppleError::from_status(code, id));
        }
    };

    scratch.clear();
    frame::encode_items(
        scratch,
        &token,
        &json,
        id,
        payload.expiration_time,
        payload.priority,
    );

    let mut out = shared.outbound.lock().await;
    if out.frame.len() + scratch.len() + NOTIFICATION_HEADER_SIZE > config.max_outbound_frame_size {
        flush_locked(&mut out, shared).await;
    }
    frame::append_notification(&mut out.frame, scratch);
    tracing::trace!(id, bytes = scratch.len(), "notification buffered");
    Ok(())
}

/// Flush while already holding the outbound lock. A write failure is a
/// hard disconnect: no further flushes, transport closed, reader woken to
/// classify the close (it reports `message_id = 0`).
async fn flush_locked<S: AsyncRead + AsyncWrite>(out: &mut Outbound<S>, shared: &Shared<S>) {
    if let Err(err) = out.flush().await {
        tracing::warn!(error = %err, "write to gateway failed; dropping connection");
        out.close().await;
        shared.reader_wake.notify_one();
    }
}

async fn flush_outbound<S: AsyncRead + AsyncWrite>(shared: &Shared<S>) {
    let mut out = shared.outbound.lock().await;
    flush_locked(&mut out, shared).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::Mutex as StdMutex;
    use std::task::{Context, Poll};

    const TOKEN: &str = "4ec500020d8350072d2417ba566feda10b2b266558371a65ba67fede21393c8f";

    fn test_payload(alert: &str) -> Payload {
        Payload {
            alert_text: alert.to_string(),
            token: TOKEN.to_string(),
            ..Payload::default()
        }
    }

    fn immediate_flush_config() -> ApnsConfig {
        ApnsConfig {
            framing_timeout: None,
            ..ApnsConfig::default()
        }
    }

    /// A transport whose writes are recorded and then fail, and whose
    /// reads never complete. Models a socket the far end tore down.
    struct WriteFailStream {
        written: Arc<StdMutex<Vec<u8>>>,
    }

    impl AsyncRead for WriteFailStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for WriteFailStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "socket closed",
            )))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn id_assignment_skips_zero_on_wrap() {
        assert_eq!(next_payload_id(0), 1);
        assert_eq!(next_payload_id(1), 2);
        assert_eq!(next_payload_id(u32::MAX), 1);
    }

    #[tokio::test]
    async fn write_error_closes_with_unknown_close_code() {
        let written = Arc::new(StdMutex::new(Vec::new()));
        let stream = WriteFailStream {
            written: Arc::clone(&written),
        };

        let mut conn = Connection::open(stream, immediate_flush_config()).unwrap();
        conn.sender().send(test_payload("Testing")).await.unwrap();

        let close = conn.closed().await.expect("terminal close");
        let error = close.error.expect("close carries an error");
        assert_eq!(error.error_code, status::CONNECTION_CLOSED_UNKNOWN);
        assert_eq!(error.message_id, 0);
        assert!(close.error_payload.is_none());
        assert!(close.unsent_payloads.is_empty());
        assert!(!close.unsent_buffer_overflow);

        // The frame made it to the transport before the write failed.
        let bytes = written.lock().unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(bytes[0], frame::NOTIFICATION_COMMAND);
    }

    #[tokio::test]
    async fn bad_token_hex_is_fatal_and_identifies_the_payload() {
        let (client, _server) = tokio::io::duplex(4096);
        let mut conn = Connection::open(client, immediate_flush_config()).unwrap();

        let mut payload = test_payload("Testing");
        payload.token = "not hex!".to_string();
        conn.sender().send(payload).await.unwrap();

        let close = conn.closed().await.expect("terminal close");
        let error = close.error.expect("close carries an error");
        assert_eq!(error.error_code, status::INVALID_TOKEN);
        assert_eq!(error.message_id, 1);
        assert_eq!(close.error_payload.expect("offender").token, "not hex!");
        assert!(close.unsent_payloads.is_empty());
    }

    #[tokio::test]
    async fn wrong_token_length_is_fatal() {
        let (client, _server) = tokio::io::duplex(4096);
        let mut conn = Connection::open(client, immediate_flush_config()).unwrap();

        let mut payload = test_payload("Testing");
        payload.token = "4ec5".to_string();
        conn.sender().send(payload).await.unwrap();

        let close = conn.closed().await.expect("terminal close");
        assert_eq!(
            close.error.expect("error").error_code,
            status::INVALID_TOKEN_SIZE
        );
    }

    #[tokio::test]
    async fn oversized_payload_is_fatal() {
        let (client, _server) = tokio::io::duplex(4096);
        let config = ApnsConfig {
            max_payload_size: 32,
            framing_timeout: None,
            ..ApnsConfig::default()
        };
        let mut conn = Connection::open(client, config).unwrap();

        let mut payload = test_payload("hi");
        payload.sound = "a-sound-name-far-longer-than-the-limit.aiff".to_string();
        conn.sender().send(payload).await.unwrap();

        let close = conn.closed().await.expect("terminal close");
        assert_eq!(
            close.error.expect("error").error_code,
            status::INVALID_PAYLOAD_SIZE
        );
    }

    #[tokio::test]
    async fn send_after_close_returns_the_payload() {
        let (client, _server) = tokio::io::duplex(4096);
        let mut conn = Connection::open(client, immediate_flush_config()).unwrap();
        let sender = conn.sender();

        let mut bad = test_payload("Testing");
        bad.token = "zz".to_string();
        sender.send(bad).await.unwrap();
        let _ = conn.closed().await;

        let err = sender
            .send(test_payload("after close"))
            .await
            .expect_err("connection is closed");
        assert_eq!(err.0.alert_text, "after close");
    }
}
