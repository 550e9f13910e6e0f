use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

/// One accepted connection travelling from the acceptor to a worker.
pub struct Job<C> {
    pub id: u64,
    pub peer: SocketAddr,
    pub conn: C,
}

/// Consumes one connection to completion.
pub trait Handler<C>: Send + Sync + 'static {
    fn handle(&self, job: Job<C>) -> impl Future<Output = ()> + Send;
}

/// Producer side of the job queue. Sending waits while the queue is full.
pub struct JobSender<C> {
    tx: mpsc::Sender<Job<C>>,
}

impl<C> Clone for JobSender<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C> JobSender<C> {
    pub async fn send(&self, job: Job<C>) -> Result<(), mpsc::error::SendError<Job<C>>> {
        self.tx.send(job).await
    }

    /// Jobs sitting in the queue that no worker has taken yet.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// A fixed set of long-lived workers sharing one bounded FIFO queue.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `size` workers behind a queue holding at most `capacity` jobs.
    /// The pool stops once every `JobSender` is dropped and the queue drains.
    pub fn spawn<C, H>(size: usize, capacity: usize, handler: Arc<H>) -> (Self, JobSender<C>)
    where
        C: Send + 'static,
        H: Handler<C>,
    {
        let (tx, rx) = mpsc::channel(capacity);
        let queue = Arc::new(Mutex::new(rx));

        let workers = (0..size)
            .map(|id| {
                tokio::spawn(worker(id, Arc::clone(&queue), Arc::clone(&handler)))
            })
            .collect();

        (Self { workers }, JobSender { tx })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    #[cfg(test)]
    pub async fn join(self) {
        for handle in self.workers {
            let _ = handle.await;
        }
    }
}

async fn worker<C, H>(id: usize, queue: Arc<Mutex<mpsc::Receiver<Job<C>>>>, handler: Arc<H>)
where
    H: Handler<C>,
{
    debug!(message = "worker started", worker = id);

    loop {
        // the lock is held only while waiting for the next job, never while handling it
        let job = queue.lock().await.recv().await;

        match job {
            Some(job) => handler.handle(job).await,
            None => break,
        }
    }

    debug!(message = "worker stopped", worker = id);
}
