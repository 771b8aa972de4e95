//! Loopback demo: a controller and a device session over localhost TCP.
//!
//! The controller toggles the LED a few times, prints the telemetry it
//! receives, then sends a malformed command and prints the error report.
//!
//! Run with `cargo run --example loopback`; set `RUST_LOG=debug` for the
//! session's own logging.

use std::time::Duration;

use iotwire::{spawn_telemetry_ticker, Session};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let device = tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await?;
        let (handle, task) = Session::builder()
            .poll_timeout(Duration::from_millis(50))
            .output_pin(|on: bool| println!("[device] led {}", if on { "ON" } else { "OFF" }))
            .start(stream)?;
        spawn_telemetry_ticker(handle, Duration::from_millis(200));
        Ok::<_, iotwire::IotwireError>(task.await.ok())
    });

    let (mut controller, _) = listener.accept().await?;
    let mut buf = [0u8; 256];

    for led in [true, false, true] {
        let command = format!(r#"{{"led": {}}}"#, led);
        controller.write_all(command.as_bytes()).await?;
        println!("[controller] sent {}", command);

        let n = controller.read(&mut buf).await?;
        println!("[controller] received {}", String::from_utf8_lossy(&buf[..n]));
    }

    controller.write_all(br#"{"led": "on"}"#).await?;
    println!("[controller] sent a string where a bool belongs");

    let mut rest = Vec::new();
    controller.read_to_end(&mut rest).await?;
    println!("[controller] received {}", String::from_utf8_lossy(&rest));

    let exit = device.await??;
    println!("[device] session ended: {:?}", exit);
    Ok(())
}
