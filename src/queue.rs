//! Bounded job queue between the single stream reader and the worker pool.
//!
//! A full queue blocks the reader (backpressure). Dropping the [`JobSender`]
//! closes the queue; workers drain what is left and then see `None`.
//! Both ends observe the run's cancellation token.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// One input line, tagged with its 1-based line number.
#[derive(Debug)]
pub struct Job {
    pub line: u64,
    pub raw: Vec<u8>,
}

pub struct JobSender {
    tx: mpsc::Sender<Job>,
}

/// Shared receiving end; cloned once per worker.
#[derive(Clone)]
pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
}

/// Outcome of a push that did not enqueue the job.
#[derive(Debug, PartialEq, Eq)]
pub enum PushError {
    Cancelled,
    Closed,
}

pub fn bounded(capacity: usize) -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        JobSender { tx },
        JobReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

impl JobSender {
    /// Waits for a free slot unless the run is cancelled first.
    pub async fn push(&self, job: Job, cancel: &CancellationToken) -> Result<(), PushError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PushError::Cancelled),
            sent = self.tx.send(job) => sent.map_err(|_| PushError::Closed),
        }
    }
}

impl JobReceiver {
    /// Next job, or `None` once the queue is closed and drained or the run is cancelled.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<Job> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            job = async { self.rx.lock().await.recv().await } => job,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job(line: u64) -> Job {
        Job {
            line,
            raw: format!("{{\"n\":{line}}}").into_bytes(),
        }
    }

    #[tokio::test]
    async fn drains_after_close() {
        let token = CancellationToken::new();
        let (tx, rx) = bounded(4);
        tx.push(job(1), &token).await.unwrap();
        tx.push(job(2), &token).await.unwrap();
        drop(tx);

        assert_eq!(rx.pop(&token).await.unwrap().line, 1);
        assert_eq!(rx.pop(&token).await.unwrap().line, 2);
        assert!(rx.pop(&token).await.is_none());
    }

    #[tokio::test]
    async fn full_queue_push_observes_cancellation() {
        let token = CancellationToken::new();
        let (tx, _rx) = bounded(1);
        tx.push(job(1), &token).await.unwrap();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        assert_eq!(tx.push(job(2), &token).await, Err(PushError::Cancelled));
    }

    #[tokio::test]
    async fn pop_observes_cancellation() {
        let token = CancellationToken::new();
        let (_tx, rx) = bounded(1);
        token.cancel();
        assert!(rx.pop(&token).await.is_none());
    }

    #[tokio::test]
    async fn push_after_receivers_dropped_is_closed() {
        let token = CancellationToken::new();
        let (tx, rx) = bounded(1);
        drop(rx);
        assert_eq!(tx.push(job(1), &token).await, Err(PushError::Closed));
    }
}
