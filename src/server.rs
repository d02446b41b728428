//! PiKV TCP server
//!
//! Owns the acceptor, hands accepted connections to sessions and runs the
//! statistics ticker next to them. All sessions and the ticker share one
//! [`Engine`].

use crate::{
    config::{AcceptMode, ServerConfig},
    engine::Engine,
    error::{PikvError, Result},
    session::{Session, SessionEnd},
    stats::{log_report, spawn_stats_ticker},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
    task::{JoinError, JoinSet},
};
use tracing::{error, info, warn};

/// PiKV TCP server
pub struct Server {
    config: ServerConfig,
    engine: Arc<Engine>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    pub fn new(config: ServerConfig, engine: Arc<Engine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            engine,
            shutdown_tx,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// Returns when [`Server::shutdown`] is called, or in serial mode when a
    /// session ends with a transport error (the acceptor is closed with it).
    /// Concurrent sessions are joined before returning, so every answered
    /// request is in the engine by then.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if self.config.stats_interval.is_zero() {
            return Err(PikvError::Server(
                "statistics interval must be non-zero".to_string(),
            ));
        }
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            mode = ?self.config.accept_mode,
            "PiKV server listening"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut sessions = JoinSet::new();
        let ticker = spawn_stats_ticker(
            Arc::clone(&self.engine),
            self.config.stats_interval,
            self.shutdown_tx.subscribe(),
            log_report,
        );

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            info!(peer = %addr, "Client connected");
                            match self.config.accept_mode {
                                AcceptMode::Serial => {
                                    let end = self.serve_inline(stream, addr, &mut shutdown_rx).await;
                                    match end {
                                        SessionEnd::PeerClosed => continue,
                                        SessionEnd::Shutdown => {
                                            info!("Shutdown signal received, stopping server...");
                                            break;
                                        }
                                        _ => {
                                            error!(peer = %addr, end = ?end, "Session failed, closing acceptor");
                                            break;
                                        }
                                    }
                                }
                                AcceptMode::Concurrent => {
                                    self.spawn_session(&mut sessions, stream, addr)
                                }
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                        }
                    }
                }

                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_joined(joined);
                }

                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        drop(listener);
        // stops the ticker and any concurrent sessions still running
        let _ = self.shutdown_tx.send(());

        // a session midway through a request answers it before it sees the signal
        if !sessions.is_empty() {
            info!(sessions = sessions.len(), "Waiting for open sessions");
        }
        while let Some(joined) = sessions.join_next().await {
            log_joined(joined);
        }
        if let Err(e) = ticker.await {
            warn!(error = %e, "Statistics ticker ended abnormally");
        }

        info!("Server stopped");
        Ok(())
    }

    async fn serve_inline(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> SessionEnd {
        let end = Session::new(stream, Arc::clone(&self.engine), addr.to_string())
            .run(shutdown_rx)
            .await;
        if let SessionEnd::PeerClosed = end {
            info!(peer = %addr, "Client disconnected");
        }
        end
    }

    fn spawn_session(&self, sessions: &mut JoinSet<()>, stream: TcpStream, addr: SocketAddr) {
        let engine = Arc::clone(&self.engine);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        sessions.spawn(async move {
            let end = Session::new(stream, engine, addr.to_string())
                .run(&mut shutdown_rx)
                .await;
            if end.is_fatal() {
                error!(peer = %addr, end = ?end, "Session failed");
            } else {
                info!(peer = %addr, "Client disconnected");
            }
        });
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send(()).map_err(|_| {
            PikvError::Server("Failed to send shutdown signal".to_string())
        })?;
        Ok(())
    }
}

fn log_joined(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Session task panicked");
    }
}
