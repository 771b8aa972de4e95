//! # iotwire
//!
//! Bounded-memory JSON control protocol engine for small networked
//! appliances.
//!
//! A peer drives one boolean output by sending `{"led": true}` style
//! objects over an already-connected byte stream, and receives periodic
//! telemetry mirroring the device state. Values arrive as a stream of
//! concatenated JSON with no length prefix.
//!
//! ## Architecture
//!
//! - **Decode path**: streaming tokenizer over a fixed scratch buffer, bound
//!   to the command schema byte by byte, so no message is ever buffered whole
//! - **Encode path**: one compact object at a time in a fixed send buffer
//! - **Session**: a single task owning the transport, decoder, buffers and
//!   device state; other tasks reach it through a [`SessionHandle`]
//!
//! Any protocol violation ends the session after one best-effort
//! `{"message": ..., "error": <code>}` report.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use iotwire::spawn_telemetry_ticker;
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> iotwire::Result<()> {
//!     let stream = TcpStream::connect("192.168.1.10:7000").await?;
//!     let (handle, task) = iotwire::start(stream, |tx| {
//!         println!("transmitting: {}", tx);
//!     });
//!
//!     spawn_telemetry_ticker(handle, Duration::from_millis(1000));
//!     if let Ok(exit) = task.await {
//!         println!("session ended: {:?}", exit);
//!     }
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod session;
pub mod writer;

mod ticker;

pub use activity::{ActivityGuard, ActivitySignal};
pub use config::SessionConfig;
pub use device::{DeviceState, NullPin, OutputPin};
pub use error::{DecodeError, EncodeError, IotwireError, Result};
pub use protocol::{Command, CommandDecoder, ParserStatus};
pub use session::{start, Session, SessionBuilder, SessionExit, SessionHandle, SessionState};
pub use ticker::spawn_telemetry_ticker;
