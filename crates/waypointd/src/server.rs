//! Server lifecycle and the accept loop.
//!
//! Teardown order on `stop`: cancel the acceptor (closing the listener),
//! cancel the sweeper, close every session, clear the indices. Both `start`
//! and `stop` gate on a compare-and-set of `running`, so `start` fails
//! loudly when already started and `stop` is an idempotent no-op.

use std::cmp;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use socket2::SockRef;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::session::Session;
use crate::state::ServerState;
use crate::{status, sweep};

pub struct RelayServer {
    state: Arc<ServerState>,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl RelayServer {
    pub fn new(config: Config) -> Self {
        Self {
            state: ServerState::new(config),
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            local_addr: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Bound address while running. Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Binds the listener and spawns the acceptor, the sweeper (when expiry
    /// is configured), and the status endpoint (when configured). Fails if
    /// the server is already started.
    pub async fn start(&self) -> Result<SocketAddr> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            bail!("relay server already started");
        }
        match self.start_inner().await {
            Ok(addr) => Ok(addr),
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> Result<SocketAddr> {
        let config = &self.state.config;
        let bind_ip = config
            .bind_addr
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let bind = SocketAddr::new(bind_ip, config.port);

        let socket = match bind_ip {
            IpAddr::V4(_) => TcpSocket::new_v4(),
            IpAddr::V6(_) => TcpSocket::new_v6(),
        }
        .context("failed to create listener socket")?;
        socket.set_reuseaddr(true).context("SO_REUSEADDR")?;
        socket
            .bind(bind)
            .with_context(|| format!("failed to bind {bind}"))?;
        let listener = socket
            .listen(config.backlog)
            .context("failed to listen")?;
        let local = listener.local_addr().context("local_addr")?;

        tracing::info!(
            addr = %local,
            backlog = config.backlog,
            linger_ms = config.linger_ms,
            read_timeout_ms = config.sock_read_timeout_ms,
            expiry_ms = config.expiry_ms,
            "relay server listening"
        );

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(accept_loop(
            self.state.clone(),
            listener,
            cancel.clone(),
        )));

        if config.expiry_ms > 0 {
            tasks.push(sweep::spawn(self.state.clone(), cancel.clone()));
        }

        if config.status_port > 0 {
            let state = self.state.clone();
            let port = config.status_port;
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = status::serve(state, port, cancel).await {
                    tracing::error!(error = %e, "status endpoint failed");
                }
            }));
        }

        *self.cancel.lock() = Some(cancel);
        *self.tasks.lock() = tasks;
        *self.local_addr.lock() = Some(local);
        Ok(local)
    }

    /// Idempotent; tolerant of never having been started.
    pub async fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        tracing::info!("stopping relay server");

        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }

        for session in self.state.sessions_snapshot() {
            session.close(&self.state).await;
        }
        self.state.clear_indices();
        *self.local_addr.lock() = None;
        tracing::debug!("relay server stopped");
    }

    /// Closes every session and empties the routing table, leaving the
    /// listener up. No-op while stopped.
    pub async fn clear(&self) {
        if !self.is_running() {
            return;
        }
        for session in self.state.sessions_snapshot() {
            session.close(&self.state).await;
        }
        self.state.routing.clear();
    }
}

async fn accept_loop(state: Arc<ServerState>, listener: TcpListener, cancel: CancellationToken) {
    let permits = Arc::new(Semaphore::new(state.config.max_conns));
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            res = listener.accept() => res,
        };
        match accepted {
            Ok((stream, peer)) => {
                apply_linger(&stream, state.config.linger_ms);
                let Ok(permit) = permits.clone().try_acquire_owned() else {
                    tracing::warn!(%peer, "session limit reached, rejecting connection");
                    drop(stream);
                    continue;
                };
                tracing::debug!(%peer, "accepted connection");
                let id = state.next_session_id();
                let (read, write) = stream.into_split();
                let session = Session::new(id, peer, write);
                state.sessions.insert(id, session.clone());
                let state = state.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    session.run(read, state).await;
                });
            }
            Err(e) => {
                if cancel.is_cancelled() {
                    break;
                }
                tracing::error!(error = %e, "accept failed");
            }
        }
    }
    tracing::debug!("acceptor stopped");
}

fn apply_linger(stream: &TcpStream, linger_ms: u64) {
    if linger_ms == 0 {
        return;
    }
    let linger = Duration::from_secs(cmp::max(1, linger_ms / 1000));
    if let Err(e) = SockRef::from(stream).set_linger(Some(linger)) {
        tracing::warn!(error = %e, "failed to set SO_LINGER");
    }
}
