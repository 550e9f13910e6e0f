use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::config::{RESPONSE, ServerConfig};
use crate::error::{ConnError, Op};
use crate::pool::{Handler, Job};
use crate::stats::Stats;

/// Serves a single connection: one bounded read, the processing delay, one
/// bounded write of the fixed response.
pub struct ConnHandler {
    deadline: Duration,
    buffer_size: usize,
    processing_delay: Duration,
    stats: Stats,
}

impl ConnHandler {
    pub fn new(config: &ServerConfig, stats: Stats) -> Self {
        Self {
            deadline: config.deadline,
            buffer_size: config.buffer_size,
            processing_delay: config.processing_delay,
            stats,
        }
    }

    /// Runs the exchange and returns how many request bytes were read. Every
    /// read and write must finish before `deadline`.
    pub async fn serve<S>(&self, stream: &mut S, deadline: Instant) -> Result<usize, ConnError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.buffer_size];

        let n = timeout_at(deadline, stream.read(&mut buf))
            .await
            .map_err(|_| ConnError::Timeout { op: Op::Read })?
            .map_err(|err| ConnError::io(Op::Read, err))?;
        if n == 0 {
            return Err(ConnError::Closed);
        }

        info!(
            message = "processing the request",
            bytes = n,
            processing = self.stats.processing()
        );
        tokio::time::sleep(self.processing_delay).await;

        timeout_at(deadline, async {
            stream.write_all(RESPONSE).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| ConnError::Timeout { op: Op::Write })?
        .map_err(|err| ConnError::io(Op::Write, err))?;

        Ok(n)
    }
}

impl<S> Handler<S> for ConnHandler
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn handle(&self, job: Job<S>) {
        let Job { id, peer, mut conn } = job;

        let _processing = self.stats.start_processing();
        let deadline = Instant::now() + self.deadline;

        match self.serve(&mut conn, deadline).await {
            Ok(n) => {
                self.stats.inc_served();
                debug!(message = "connection served", conn = id, %peer, bytes = n);

                // best effort FIN; the stream is dropped right after either way
                let _ = timeout_at(deadline, conn.shutdown()).await;
            }
            Err(err) => {
                self.stats.inc_failed();

                let timeout = err.is_timeout();
                match err.op() {
                    Op::Read => warn!(message = "read error", conn = id, %peer, timeout, %err),
                    Op::Write => warn!(message = "write error", conn = id, %peer, timeout, %err),
                }
            }
        }

        // `conn` is dropped here, closing it exactly once on every path
    }
}
