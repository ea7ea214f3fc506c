//! HTTP listener with bounded graceful shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower::Service;
use tracing::{debug, error, info, warn};

use bbs_common::shutdown::ShutdownSignal;

use crate::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Unbound,
    Bound,
    Serving,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub addr: String,
    /// How long in-flight connections may take to finish once shutdown starts.
    pub shutdown_timeout: Duration,
}

pub struct Server {
    options: ServerOptions,
    router: Router,
    started: AtomicBool,
    served: AtomicBool,
    state: watch::Sender<ServerState>,
    local_addr: OnceLock<SocketAddr>,
}

impl Server {
    pub fn new(options: ServerOptions, router: Router) -> Self {
        Self {
            options,
            router,
            started: AtomicBool::new(false),
            served: AtomicBool::new(false),
            state: watch::Sender::new(ServerState::Unbound),
            local_addr: OnceLock::new(),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Address actually bound, once the listener is up.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Resolves true once the server accepts connections, false if it stopped
    /// without ever serving.
    pub async fn has_started(&self) -> bool {
        let mut state = self.state.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        if state
            .wait_for(|s| matches!(s, ServerState::Serving | ServerState::Stopped))
            .await
            .is_err()
        {
            return false;
        }
        self.served.load(Ordering::SeqCst)
    }

    /// Resolves once the listener is closed and every connection is gone.
    pub async fn has_stopped(&self) {
        let mut state = self.state.subscribe();
        if state.wait_for(|s| *s == ServerState::Stopped).await.is_err() {
            debug!("server state channel closed");
        }
    }

    /// Bind, then serve until `shutdown` fires or accepting fails. Always returns
    /// an error: [`ServerError::Cancelled`] after a shutdown.
    pub async fn run(&self, shutdown: &ShutdownSignal) -> Result<(), ServerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyStarted);
        }

        let listener = match TcpListener::bind(&self.options.addr).await {
            Ok(listener) => listener,
            Err(source) => {
                error!(addr = %self.options.addr, error = %source, "failed to bind");
                self.state.send_replace(ServerState::Stopped);
                return Err(ServerError::Bind {
                    addr: self.options.addr.clone(),
                    source,
                });
            }
        };
        if let Ok(addr) = listener.local_addr() {
            self.local_addr.get_or_init(|| addr);
        }
        self.state.send_replace(ServerState::Bound);

        if shutdown.is_cancelled() {
            drop(listener);
            self.state.send_replace(ServerState::Stopped);
            return Err(ServerError::Cancelled);
        }

        info!(addr = ?self.local_addr(), "listening");
        self.served.store(true, Ordering::SeqCst);
        self.state.send_replace(ServerState::Serving);

        let result = self.serve(listener, shutdown).await;

        self.state.send_replace(ServerState::Stopped);
        info!("HTTP server stopped");
        result
    }

    async fn serve(
        &self,
        listener: TcpListener,
        shutdown: &ShutdownSignal,
    ) -> Result<(), ServerError> {
        let builder = AutoBuilder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();

        let outcome = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("shutdown signal received, stopping accept loop");
                    break Err(ServerError::Cancelled);
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        debug!("connection task ended abnormally: {}", e);
                    }
                }
                result = listener.accept() => {
                    let (socket, remote_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) if is_transient(&e) => {
                            warn!("failed to accept connection: {}", e);
                            continue;
                        }
                        Err(e) => {
                            error!("accept loop failed: {}", e);
                            break Err(ServerError::Accept(e));
                        }
                    };

                    if let Err(e) = socket.set_nodelay(true) {
                        warn!("failed to set TCP_NODELAY: {}", e);
                    }

                    let app = self.router.clone();
                    let service = hyper::service::service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                        let mut app = app.clone();
                        let mut req = req.map(axum::body::Body::new);
                        req.extensions_mut().insert(ConnectInfo(remote_addr));
                        async move { app.call(req).await }
                    });

                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(socket), service);
                    let conn = graceful.watch(conn.into_owned());

                    connections.spawn(async move {
                        if let Err(e) = conn.await {
                            debug!("connection closed: {}", e);
                        }
                    });
                }
            }
        };

        drop(listener);

        let timeout = self.options.shutdown_timeout;
        if tokio::time::timeout(timeout, graceful.shutdown()).await.is_err() {
            warn!(
                ?timeout,
                remaining = connections.len(),
                "graceful shutdown timed out, closing remaining connections"
            );
            connections.abort_all();
        }
        while connections.join_next().await.is_some() {}

        outcome
    }
}

/// Accept errors that concern a single connection rather than the listener.
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
    )
}
