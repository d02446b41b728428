//! Server-side session
//!
//! One session serves one accepted connection:
//!
//! ```text
//! AwaitingRequest -> Executing -> SendingResponse -> AwaitingRequest ...
//!        |                              |
//!        +-------------> Closed <-------+
//! ```
//!
//! Exactly one request is in flight at a time; the next frame is read only
//! after the previous response has been written.

use crate::engine::Engine;
use crate::frame::Frame;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingRequest,
    Executing,
    SendingResponse,
    Closed,
}

/// Why a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer went away between requests; a normal lifecycle event
    PeerClosed,
    /// The server is shutting down
    Shutdown,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
}

impl SessionEnd {
    /// Whether the end was caused by a transport error
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionEnd::ReadFailed(_) | SessionEnd::WriteFailed(_))
    }
}

/// A connection being served
pub struct Session<S> {
    stream: S,
    engine: Arc<Engine>,
    peer: String,
    state: SessionState,
    served: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, engine: Arc<Engine>, peer: impl Into<String>) -> Self {
        Self {
            stream,
            engine,
            peer: peer.into(),
            state: SessionState::AwaitingRequest,
            served: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve requests until the peer disconnects, an I/O error occurs or
    /// `shutdown` fires. The stream is dropped (closed) on return.
    pub async fn run(mut self, shutdown: &mut broadcast::Receiver<()>) -> SessionEnd {
        let end = self.serve(shutdown).await;
        self.transition(SessionState::Closed);
        debug!(peer = %self.peer, served = self.served, end = ?end, "Session closed");
        end
    }

    async fn serve(&mut self, shutdown: &mut broadcast::Receiver<()>) -> SessionEnd {
        loop {
            self.transition(SessionState::AwaitingRequest);

            let request = tokio::select! {
                result = Frame::read_from(&mut self.stream) => match result {
                    Ok(frame) => frame,
                    Err(e) if is_disconnect(&e) => return SessionEnd::PeerClosed,
                    Err(e) => return SessionEnd::ReadFailed(e),
                },
                _ = shutdown.recv() => return SessionEnd::Shutdown,
            };

            self.transition(SessionState::Executing);
            debug!(
                peer = %self.peer,
                request = %request.text().replace('\n', "\t"),
                "Received from client"
            );
            let outcome = self.engine.execute(request.as_bytes());

            self.transition(SessionState::SendingResponse);
            let response = Frame::encode_truncated(&outcome.message);
            if let Err(e) = response.write_to(&mut self.stream).await {
                return SessionEnd::WriteFailed(e);
            }
            debug!(peer = %self.peer, response = %outcome.message, "Sent to client");
            self.served += 1;
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!(peer = %self.peer, from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}

/// EOF (also mid-frame), reset and abort all mean the client went away
fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
