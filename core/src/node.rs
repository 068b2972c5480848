use crate::context::Context;
use crate::handler;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

/// How long sessions and peer senders get to wind down after the
/// shutdown flag flips.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot bind port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },
}

/// One running herd member: the bound listener plus the sender task per
/// configured neighbor.
#[derive(Debug)]
pub struct Node {
    ctx: Arc<Context>,
    listener: TcpListener,
    shutdown: watch::Receiver<bool>,
    sender_handles: Vec<JoinHandle<()>>,
}

impl Node {
    /// Bind the member's configured port and start the peer senders.
    /// Bind failure is fatal; the caller turns it into a nonzero exit.
    pub async fn bind(ctx: Arc<Context>, shutdown: watch::Receiver<bool>) -> Result<Self, Error> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, ctx.member.port));
        let listener =
            TcpListener::bind(addr).await.map_err(|source| Error::Bind { port: ctx.member.port, source })?;
        let sender_handles = ctx.links.spawn_senders(&shutdown);
        info!(member = %ctx.member.name, %addr, neighbors = ctx.member.neighbors.len(), "listening");
        Ok(Self { ctx, listener, shutdown, sender_handles })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown, then close the listener and
    /// give sessions and sender state machines a bounded grace window.
    pub async fn run(mut self) {
        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        sessions.spawn(handler::run_session(Arc::clone(&self.ctx), stream, self.shutdown.clone()));
                        // reap whatever already finished
                        while sessions.try_join_next().is_some() {}
                    }
                    Err(e) => {
                        warn!(member = %self.ctx.member.name, "accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }
        drop(self.listener);

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while sessions.join_next().await.is_some() {}
            for handle in self.sender_handles.iter_mut() {
                let _ = handle.await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(member = %self.ctx.member.name, "grace window expired, aborting tasks");
            sessions.abort_all();
            for handle in &self.sender_handles {
                handle.abort();
            }
        }
        info!(member = %self.ctx.member.name, "shutdown complete");
    }
}

/// Resolves on ctrl-c or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
