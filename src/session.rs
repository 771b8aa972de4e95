//! Session builder and runtime loop.
//!
//! The [`SessionBuilder`] provides a fluent API for configuring a session
//! over an already-connected transport. The [`Session`] owns everything one
//! connection needs (decoder, send buffer, device state) and runs the loop:
//! 1. Exit if a stop was requested
//! 2. Service queued telemetry requests
//! 3. Wait for inbound bytes, bounded by the poll timeout
//! 4. Decode the chunk and apply every completed command
//!
//! A protocol violation sends one best-effort error report and ends the
//! session. Other tasks talk to a running session only through its
//! [`SessionHandle`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use iotwire::{spawn_telemetry_ticker, Session};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> iotwire::Result<()> {
//!     let stream = TcpStream::connect("127.0.0.1:7000").await?;
//!     let (handle, task) = Session::builder()
//!         .output_pin(|on: bool| println!("led {}", if on { "on" } else { "off" }))
//!         .on_activity(|tx| println!("transmitting: {}", tx))
//!         .start(stream)?;
//!
//!     spawn_telemetry_ticker(handle.clone(), Duration::from_secs(1));
//!     let exit = task.await.expect("session task panicked");
//!     println!("session ended: {:?}", exit);
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::activity::ActivitySignal;
use crate::config::SessionConfig;
use crate::device::{DeviceState, NullPin, OutputPin};
use crate::error::{DecodeError, IotwireError, Result};
use crate::protocol::{encode_error_report, encode_telemetry, CommandDecoder, ParserStatus};
use crate::writer::{flush, SendBuffer, IO_BUFFER_SIZE};

/// Reply slot for one queued telemetry request.
type TelemetryReply = oneshot::Sender<Result<bool>>;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Loop is serving the transport.
    Running,
    /// Loop decided to end and is sending its error report.
    Stopping,
    /// Loop has returned.
    Closed,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Running,
            1 => SessionState::Stopping,
            _ => SessionState::Closed,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// Stop flag observed.
    Stopped,
    /// Peer closed its side of the transport.
    PeerClosed,
    /// Transport read or telemetry write failed.
    TransportFailed,
    /// Inbound stream broke the protocol.
    ProtocolViolation(DecodeError),
}

impl SessionExit {
    /// Wire error code, for protocol violations.
    pub fn error_code(&self) -> Option<i32> {
        match self {
            SessionExit::ProtocolViolation(err) => Some(err.code()),
            _ => None,
        }
    }
}

/// Builder for configuring and creating a session.
pub struct SessionBuilder {
    config: SessionConfig,
    pin: Box<dyn OutputPin>,
    activity: ActivitySignal,
}

impl SessionBuilder {
    /// Create a builder with the default configuration, a [`NullPin`] and
    /// an unobserved activity signal.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            pin: Box::new(NullPin),
            activity: ActivitySignal::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how long one transport read waits before the loop re-checks the
    /// stop flag and queued requests.
    ///
    /// Default: 50 ms
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the telemetry request queue capacity.
    ///
    /// Default: 4
    pub fn request_capacity(mut self, capacity: usize) -> Self {
        self.config.request_capacity = capacity;
        self
    }

    /// Set the text of the error report.
    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.config.error_message = message.into();
        self
    }

    /// Drive the boolean output through `pin`.
    pub fn output_pin<P: OutputPin>(mut self, pin: P) -> Self {
        self.pin = Box::new(pin);
        self
    }

    /// Call `observer` whenever the transmitting signal changes.
    pub fn on_activity<F>(mut self, observer: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.activity = ActivitySignal::with_observer(observer);
        self
    }

    /// Share an existing activity signal.
    pub fn activity(mut self, activity: ActivitySignal) -> Self {
        self.activity = activity;
        self
    }

    /// Build the session without starting it.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration does not validate.
    pub fn build<T>(self, transport: T) -> Result<(Session<T>, SessionHandle)>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.config.validate()?;
        Ok(self.assemble(transport))
    }

    /// Build the session and spawn its loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration does not validate.
    pub fn start<T>(self, transport: T) -> Result<(SessionHandle, JoinHandle<SessionExit>)>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (session, handle) = self.build(transport)?;
        Ok((handle, session.spawn()))
    }

    fn assemble<T>(self, transport: T) -> (Session<T>, SessionHandle)
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(SessionState::Running as u8));
        let (request_tx, request_rx) = mpsc::channel(self.config.request_capacity.max(1));

        let handle = SessionHandle {
            stop: stop.clone(),
            state: state.clone(),
            requests: request_tx,
            activity: self.activity.clone(),
        };

        let session = Session {
            transport,
            config: self.config,
            decoder: CommandDecoder::new(),
            send_buffer: SendBuffer::new(),
            device: DeviceState::new(self.pin),
            activity: self.activity,
            stop,
            requests: request_rx,
            state,
            exit: None,
            error_sent: false,
        };

        (session, handle)
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Start a session with default settings and spawn its loop.
///
/// `on_activity` is told when a transport write starts and ends.
pub fn start<T, F>(transport: T, on_activity: F) -> (SessionHandle, JoinHandle<SessionExit>)
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Fn(bool) + Send + Sync + 'static,
{
    let (session, handle) = SessionBuilder::new()
        .on_activity(on_activity)
        .assemble(transport);
    (handle, session.spawn())
}

/// One connection's protocol engine.
pub struct Session<T> {
    transport: T,
    config: SessionConfig,
    decoder: CommandDecoder,
    send_buffer: SendBuffer,
    device: DeviceState,
    activity: ActivitySignal,
    stop: Arc<AtomicBool>,
    requests: mpsc::Receiver<TelemetryReply>,
    /// Shared with handles as a `SessionState` discriminant.
    state: Arc<AtomicU8>,
    exit: Option<SessionExit>,
    /// The error report goes out at most once.
    error_sent: bool,
}

impl Session<()> {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Device state as updated by applied commands.
    #[inline]
    pub fn device(&self) -> &DeviceState {
        &self.device
    }

    /// Decoder status.
    #[inline]
    pub fn parser_status(&self) -> ParserStatus {
        self.decoder.status()
    }

    /// Run the loop until a stop request, peer close, transport failure or
    /// protocol violation.
    ///
    /// Calling `run` again after it returned yields the same exit at once.
    pub async fn run(&mut self) -> SessionExit {
        if let Some(exit) = self.exit {
            return exit;
        }

        let poll_timeout = self.config.poll_timeout();
        let mut chunk = [0u8; IO_BUFFER_SIZE];

        let exit = loop {
            if self.stop.load(Ordering::Acquire) {
                tracing::debug!("Stop requested, ending session");
                break SessionExit::Stopped;
            }

            if !self.service_requests().await {
                break SessionExit::TransportFailed;
            }

            let read = tokio::time::timeout(poll_timeout, self.transport.read(&mut chunk)).await;
            match read {
                // Poll tick; nothing arrived.
                Err(_) => continue,
                Ok(Ok(0)) => {
                    tracing::debug!("Peer closed the transport");
                    break SessionExit::PeerClosed;
                }
                Ok(Ok(n)) => {
                    if let Err(err) = self.receive(&chunk[..n]) {
                        self.set_state(SessionState::Stopping);
                        tracing::error!("Protocol violation: {} (code {})", err, err.code());
                        if let Err(e) = self.send_error(err).await {
                            tracing::warn!("Error report not delivered: {}", e);
                        }
                        break SessionExit::ProtocolViolation(err);
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!("Transport read failed: {}", e);
                    break SessionExit::TransportFailed;
                }
            }
        };

        self.close_requests();
        self.set_state(SessionState::Closed);
        self.exit = Some(exit);
        exit
    }

    /// Send `{"led": <state>}` unless an inbound value is half-parsed.
    ///
    /// # Returns
    ///
    /// `true` if the object was written, `false` if the send was dropped
    /// because the decoder is in the middle of a value.
    ///
    /// # Errors
    ///
    /// Returns the transport error. The send buffer is empty afterward
    /// either way.
    pub async fn send_telemetry(&mut self) -> Result<bool> {
        if self.decoder.is_in_progress() {
            tracing::debug!("Telemetry dropped, inbound value in progress");
            return Ok(false);
        }

        encode_telemetry(&mut self.send_buffer, self.device.led())?;
        flush(&mut self.transport, &mut self.send_buffer, &self.activity).await?;
        Ok(true)
    }

    /// Decode one chunk, applying completed commands to the device.
    fn receive(&mut self, chunk: &[u8]) -> std::result::Result<usize, DecodeError> {
        let device = &mut self.device;
        let applied = self.decoder.push(chunk, |command| device.apply(command))?;
        if applied > 0 {
            tracing::trace!("Applied {} command(s) from {} bytes", applied, chunk.len());
        }
        Ok(applied)
    }

    /// Best-effort `{"message", "error"}` report, at most once per session.
    async fn send_error(&mut self, err: DecodeError) -> Result<bool> {
        if self.error_sent || self.decoder.is_in_progress() {
            return Ok(false);
        }
        self.error_sent = true;

        encode_error_report(&mut self.send_buffer, &self.config.error_message, err.code())?;
        flush(&mut self.transport, &mut self.send_buffer, &self.activity).await?;
        Ok(true)
    }

    /// Answer every telemetry request queued since the last iteration.
    ///
    /// Returns `false` after the first failed send. The failing requester
    /// gets the error; requests still queued are left for `close_requests`.
    async fn service_requests(&mut self) -> bool {
        while let Ok(reply) = self.requests.try_recv() {
            let outcome = self.send_telemetry().await;
            let failed = match &outcome {
                Ok(_) => false,
                Err(e) => {
                    tracing::warn!("Telemetry send failed, ending session: {}", e);
                    true
                }
            };
            // Requester may have given up waiting.
            let _ = reply.send(outcome);
            if failed {
                return false;
            }
        }
        true
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Refuse new requests and drop queued ones, failing their waiters.
    fn close_requests(&mut self) {
        self.requests.close();
        while self.requests.try_recv().is_ok() {}
    }
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Spawn the loop on the current tokio runtime.
    pub fn spawn(mut self) -> JoinHandle<SessionExit> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Cloneable control surface of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    requests: mpsc::Sender<TelemetryReply>,
    activity: ActivitySignal,
}

impl SessionHandle {
    /// Ask the loop to end. It notices within one poll timeout.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Current lifecycle state of the session.
    #[inline]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check whether a stop was requested.
    #[inline]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Check whether the session is writing to the transport right now.
    #[inline]
    pub fn is_transmitting(&self) -> bool {
        self.activity.is_active()
    }

    /// Check whether the session loop has ended.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }

    /// Ask the loop to send telemetry and wait for the outcome.
    ///
    /// The request is serviced at the start of the next loop iteration.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the session has ended, or the
    /// transport error from the send itself.
    pub async fn send_telemetry(&self) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(reply_tx)
            .await
            .map_err(|_| IotwireError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| IotwireError::ConnectionClosed)?
    }
}
