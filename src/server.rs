use anyhow::{Context, Result};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::conn::ConnHandler;
use crate::gate::AdmissionGate;
use crate::pool::{Job, JobSender, WorkerPool};
use crate::stats::Stats;

/// Anything that hands out accepted connections.
pub trait ConnectionSource: Send + 'static {
    type Conn: Send + 'static;

    fn accept(&self) -> impl Future<Output = io::Result<(Self::Conn, SocketAddr)>> + Send;
}

impl ConnectionSource for TcpListener {
    type Conn = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Binds the listener and serves forever. Only a bind failure returns.
pub async fn run(config: ServerConfig, stats: Stats) -> Result<()> {
    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to listen on {}", config.listen))?;

    info!(
        message = "server started",
        listen = %config.listen,
        pool_size = config.pool_size,
        max_threads = config.max_threads,
        queue_capacity = config.queue_capacity,
    );

    serve(listener, &config, stats).await;

    Ok(())
}

/// Starts the worker pool and runs the acceptor loop on `source`.
pub async fn serve<S>(source: S, config: &ServerConfig, stats: Stats)
where
    S: ConnectionSource,
    S::Conn: AsyncRead + AsyncWrite + Unpin,
{
    let handler = Arc::new(ConnHandler::new(config, stats.clone()));
    let (pool, jobs) = WorkerPool::spawn(config.pool_size, config.queue_capacity, handler);
    let gate = AdmissionGate::new(config.max_threads);
    debug!(message = "worker pool started", workers = pool.size(), admission = gate.capacity());

    Acceptor::new(source, gate, jobs, stats).run().await
}

pub struct Acceptor<S: ConnectionSource> {
    source: S,
    gate: AdmissionGate,
    jobs: JobSender<S::Conn>,
    stats: Stats,
}

impl<S: ConnectionSource> Acceptor<S> {
    pub fn new(source: S, gate: AdmissionGate, jobs: JobSender<S::Conn>, stats: Stats) -> Self {
        Self {
            source,
            gate,
            jobs,
            stats,
        }
    }

    /// Accepts forever. A failed accept is logged and skipped; each accepted
    /// connection gets its own dispatch task so this loop never waits on the
    /// gate or the queue.
    pub async fn run(self) {
        loop {
            debug!(message = "waiting for a client to connect");

            let (conn, peer) = match self.source.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    self.stats.inc_accept_errors();
                    warn!(message = "accept error", %err);
                    continue;
                }
            };

            let id = self.stats.inc_accepted();
            debug!(message = "accepted connection", conn = id, %peer);

            tokio::spawn(dispatch(
                self.gate.clone(),
                self.jobs.clone(),
                Job { id, peer, conn },
            ));
        }
    }
}

/// Gated handoff of one connection into the job queue. The gate slot is held
/// until the enqueue finishes, not until the connection is served.
async fn dispatch<C>(gate: AdmissionGate, jobs: JobSender<C>, job: Job<C>) {
    let _permit = match gate.acquire().await {
        Ok(permit) => permit,
        Err(err) => {
            error!(message = "admission gate closed", conn = job.id, %err);
            return;
        }
    };

    let id = job.id;
    match jobs.send(job).await {
        Ok(()) => debug!(
            message = "connection queued",
            conn = id,
            queued = jobs.queued(),
            admitting = gate.in_flight()
        ),
        Err(err) => {
            error!(message = "job queue closed, dropping connection", conn = id, peer = %err.0.peer)
        }
    }
}
