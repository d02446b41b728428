//! Client library for connecting to a PiKV server
//!
//! ```text
//! Connecting --(retry after backoff while within budget)--> Connecting
//! Connecting -> Writing -> AwaitingResponse -> Done
//!      \____________\___________\______________> Closed (error)
//! ```
//!
//! Only the connection phase retries. Any read or write error is final.

use crate::config::RetryPolicy;
use crate::error::{PikvError, Result};
use crate::frame::Frame;
use crate::protocol::Command;
use std::io;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Client for connecting to a PiKV server
pub struct Client {
    stream: TcpStream,
    addr: String,
}

impl Client {
    /// Connect to a PiKV server with a single attempt
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            addr: addr.to_string(),
        })
    }

    /// Connect, retrying failed attempts after `policy.backoff` until
    /// `policy.budget` has been used up.
    pub async fn connect_with_retry(addr: &str, policy: &RetryPolicy) -> Result<Self> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let remaining = policy.budget.saturating_sub(started.elapsed());
            let attempt = match timeout(remaining, TcpStream::connect(addr)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection attempt timed out",
                )),
            };

            match attempt {
                Ok(stream) => {
                    info!(addr, attempts, "Connected to server");
                    return Ok(Self {
                        stream,
                        addr: addr.to_string(),
                    });
                }
                Err(e) if started.elapsed() >= policy.budget => {
                    return Err(PikvError::ConnectTimeout {
                        addr: addr.to_string(),
                        attempts,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(
                        addr,
                        attempt = attempts,
                        error = %e,
                        "Unsuccessful attempt to connect to the server, retrying"
                    );
                    sleep(policy.backoff).await;
                }
            }
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send a command and wait for the server's answer
    pub async fn request(&mut self, command: &Command) -> Result<String> {
        let frame = prepare(command)?;
        self.exchange(&frame).await
    }

    /// Send a raw request payload and wait for the answer
    pub async fn request_payload(&mut self, payload: &str) -> Result<String> {
        let frame = Frame::encode(payload)?;
        self.exchange(&frame).await
    }

    async fn exchange(&mut self, frame: &Frame) -> Result<String> {
        frame.write_to(&mut self.stream).await?;
        debug!(request = %frame.text().replace('\n', "\t"), "Sent to server");

        let answer = Frame::read_from(&mut self.stream).await?;
        let answer = answer.text().into_owned();
        debug!(answer = %answer, "Answer from server");
        Ok(answer)
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Validate a command and frame it
fn prepare(command: &Command) -> Result<Frame> {
    command.validate()?;
    Frame::encode(&command.to_payload())
}

/// Run one full client exchange: connect (with retry), send `command`,
/// read the answer and close.
///
/// The command is validated and framed before any connection attempt.
pub async fn execute_once(addr: &str, policy: &RetryPolicy, command: &Command) -> Result<String> {
    let frame = prepare(command)?;

    let mut client = Client::connect_with_retry(addr, policy).await?;
    let answer = client.exchange(&frame).await;

    if let Err(e) = client.close().await {
        debug!(error = %e, "Failed to close connection cleanly");
    }
    answer
}
