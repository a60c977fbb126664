//! Defines the worker owning a single in-flight job's lifecycle.

use std::sync::Arc;

use log::{debug, info, warn};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::oneshot;

use super::keys::QueueKeys;
use crate::models::{ConvoyResult, Duration, Job, Timestamp};

/// Message recorded when the per-job timer fires before the handler
/// completes.
const TIMEOUT_MESSAGE: &str = "timeout";

/// Terminal signal sent by a job handler through its `Completion` handle.
#[derive(Debug)]
pub(crate) enum Outcome {
    Success,
    Error(String),
}

/// Completion handle handed to a job handler alongside the job.
///
/// The handler resolves its job by calling [`Completion::success`] or
/// [`Completion::error`] exactly once; the handle is consumed by either.
/// Signals arriving after the job has already timed out are ignored.
/// Dropping the handle without signalling abandons the job: the worker slot
/// is released, and the id stays in the processing set until the jam guard
/// reclaims it (or until the configured job timeout fires).
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<Outcome>,
}

impl Completion {
    pub(crate) fn new(tx: oneshot::Sender<Outcome>) -> Self {
        Completion { tx }
    }

    /// Report that the job finished successfully.
    pub fn success(self) {
        let _ = self.tx.send(Outcome::Success);
    }

    /// Report that the job failed with the given error message.
    pub fn error<S: Into<String>>(self, message: S) {
        let _ = self.tx.send(Outcome::Error(message.into()));
    }
}

/// Owns one (queue, job) pair from dispatch to its single terminal
/// transition.
///
/// The worker borrows the queue's key namespace and connection; it owns
/// nothing persistent itself.
pub(crate) struct Worker {
    job: Job,
    keys: Arc<QueueKeys>,
    conn: ConnectionManager,
    log_ttl: Duration,
    timeout: Option<Duration>,
}

impl Worker {
    pub fn new(
        job: Job,
        keys: Arc<QueueKeys>,
        conn: ConnectionManager,
        log_ttl: Duration,
        timeout: Option<Duration>,
    ) -> Self {
        Worker {
            job,
            keys,
            conn,
            log_ttl,
            timeout,
        }
    }

    /// Reserve the job: upsert it into the processing set scored with the
    /// current time. Runs before the handler is invoked, so a worker crash
    /// from here on leaves a timestamped entry for the jam guard.
    pub async fn mark_processing(&mut self) -> ConvoyResult<()> {
        let now = Timestamp::now();
        let _: () = self
            .conn
            .zadd(&self.keys.processing, self.job.id(), now)
            .await?;
        debug!("[{}] job {} processing since {}", self.keys.base, self.job, now);
        Ok(())
    }

    /// Drive the job to its terminal transition.
    ///
    /// Waits on the handler's completion signal, racing it against the job
    /// timeout when one is configured. Whichever arrives first wins; a late
    /// handler signal after a timeout is dropped on the floor. A handler
    /// that goes away without signalling still times out if a timer is
    /// configured, and is otherwise left to the jam guard.
    pub async fn run(mut self, rx: oneshot::Receiver<Outcome>) -> ConvoyResult<()> {
        let outcome = match self.timeout {
            Some(ref timeout) => {
                let timer = tokio::time::sleep(timeout.0);
                tokio::pin!(timer);
                let mut rx = rx;
                tokio::select! {
                    _ = &mut timer => Some(Outcome::Error(TIMEOUT_MESSAGE.to_owned())),
                    received = &mut rx => match received {
                        Ok(outcome) => Some(outcome),
                        Err(_) => {
                            // handler dropped the handle; the timer still decides
                            timer.await;
                            Some(Outcome::Error(TIMEOUT_MESSAGE.to_owned()))
                        }
                    },
                }
            }
            None => rx.await.ok(),
        };

        match outcome {
            Some(Outcome::Success) => self.completed().await,
            Some(Outcome::Error(message)) => self.failed(&message).await,
            None => {
                warn!(
                    "[{}] handler abandoned job {} without completing; leaving it for the jam guard",
                    self.keys.base, self.job
                );
                Ok(())
            }
        }
    }

    /// Mark the job as successfully completed: drop it from the committed
    /// set and the processing set in one atomic step.
    async fn completed(&mut self) -> ConvoyResult<()> {
        redis::pipe()
            .atomic()
            .srem(&self.keys.committed, self.job.id())
            .ignore()
            .zrem(&self.keys.processing, self.job.id())
            .ignore()
            .query_async::<_, ()>(&mut self.conn)
            .await?;
        info!("[{}] job {} completed", self.keys.base, self.job);
        Ok(())
    }

    /// Mark the job as failed: drop it from the committed and processing
    /// sets, record it in the failed set, and append the message to the
    /// current day's error log, all in one atomic step. The log key's TTL
    /// is refreshed on every write.
    async fn failed(&mut self, message: &str) -> ConvoyResult<()> {
        let now = Timestamp::now();
        let log_key = self.keys.error_log(now.day_start());
        redis::pipe()
            .atomic()
            .srem(&self.keys.committed, self.job.id())
            .ignore()
            .zrem(&self.keys.processing, self.job.id())
            .ignore()
            .zadd(&self.keys.failed, self.job.id(), now)
            .ignore()
            .rpush(&log_key, message)
            .ignore()
            .expire(&log_key, self.log_ttl.as_secs() as usize)
            .ignore()
            .query_async::<_, ()>(&mut self.conn)
            .await?;
        info!("[{}] job {} failed: {}", self.keys.base, self.job, message);
        Ok(())
    }
}
