//! Periodic telemetry.
//!
//! Asks a session to send its device state on a fixed period. A send the
//! session drops (decoder mid-value) is simply skipped until the next tick.
//! A transport failure stops the session instead of retrying forever.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::IotwireError;
use crate::session::SessionHandle;

/// Spawn a task requesting telemetry every `period`.
///
/// The first request goes out one period after the call. The task ends when
/// the session ends, when a stop is requested, or after a failed send (which
/// also stops the session).
pub fn spawn_telemetry_ticker(handle: SessionHandle, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticks.tick().await;

        loop {
            ticks.tick().await;
            if handle.is_stop_requested() {
                break;
            }

            match handle.send_telemetry().await {
                Ok(true) => {}
                Ok(false) => tracing::trace!("Telemetry tick skipped"),
                Err(IotwireError::ConnectionClosed) => {
                    tracing::debug!("Session gone, telemetry ticker exiting");
                    break;
                }
                Err(e) => {
                    tracing::warn!("Telemetry failed, stopping session: {}", e);
                    handle.stop();
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionExit};
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

    const POLL: Duration = Duration::from_millis(10);
    const PERIOD: Duration = Duration::from_millis(20);
    const DEADLINE: Duration = Duration::from_secs(5);

    /// Transport that never yields data and fails every write.
    struct WriteFails;

    impl AsyncRead for WriteFails {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for WriteFails {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_ticker_sends_periodically() {
        let (transport, mut peer) = duplex(1024);
        let (handle, task) = Session::builder()
            .poll_timeout(POLL)
            .start(transport)
            .unwrap();
        let ticker = spawn_telemetry_ticker(handle.clone(), PERIOD);

        let expected = br#"{"led":false}{"led":false}"#;
        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        while received.len() < expected.len() {
            let n = tokio::time::timeout(DEADLINE, peer.read(&mut buf))
                .await
                .unwrap()
                .unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(&received[..expected.len()], expected);

        handle.stop();
        assert_eq!(task.await.unwrap(), SessionExit::Stopped);
        tokio::time::timeout(DEADLINE, ticker).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ticker_exits_when_session_ends() {
        let (transport, peer) = duplex(1024);
        let (handle, task) = Session::builder()
            .poll_timeout(POLL)
            .start(transport)
            .unwrap();
        let ticker = spawn_telemetry_ticker(handle, PERIOD);

        drop(peer);
        assert_eq!(task.await.unwrap(), SessionExit::PeerClosed);
        tokio::time::timeout(DEADLINE, ticker).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ticker_stops_session_on_transport_failure() {
        let (handle, task) = Session::builder()
            .poll_timeout(POLL)
            .start(WriteFails)
            .unwrap();
        let ticker = spawn_telemetry_ticker(handle.clone(), PERIOD);

        tokio::time::timeout(DEADLINE, ticker).await.unwrap().unwrap();
        assert!(handle.is_stop_requested());
        assert_eq!(task.await.unwrap(), SessionExit::TransportFailed);
    }
}
