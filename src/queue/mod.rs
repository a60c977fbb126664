//! The queue state machine and its coordination protocol over Redis.
//!
//! A [`Queue`] owns the six Redis keys for one named queue and every
//! transition between them: deduplicated admission, the blocking dispatch
//! loop, per-process worker concurrency, terminal bookkeeping, and recovery
//! of jobs stranded by crashed workers.

mod keys;
mod worker;

pub use self::worker::Completion;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::models::{
    AddStatus, ConvoyError, ConvoyResult, Duration, Job, QueueStats, Timestamp,
};
use crate::transaction_async;
use self::keys::QueueKeys;
use self::worker::Worker;

/// How long a single blocking pop may wait before the dispatch loop wakes up
/// and re-checks its stop flag.
const POP_WAIT_SECS: f64 = 1.0;

/// Per-queue tuning accepted by [`crate::Convoy::create_queue`].
#[derive(Clone, Debug)]
pub struct QueueOptions {
    /// Maximum number of jobs this process runs concurrently for the queue.
    pub concurrent_workers: usize,

    /// How long a single job may occupy a worker before it is failed with
    /// a "timeout" message. No per-job timer runs when unset.
    pub job_timeout: Option<Duration>,

    /// How often the jam guard scans the processing set. When unset, the
    /// staleness threshold passed to [`Queue::start_jam_guard`] is reused
    /// as the scan period.
    pub jam_guard_interval: Option<Duration>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            concurrent_workers: 1,
            job_timeout: None,
            jam_guard_interval: None,
        }
    }
}

/// A handler invoked for each job dispatched to this process.
///
/// The handler receives the job and a [`Completion`] handle, and reports the
/// job's outcome through the handle. Handlers run on their worker's task;
/// long-running work can move the handle into a spawned task and resolve it
/// from there.
pub trait JobHandler: Send + Sync + 'static {
    fn handle(&self, job: Job, done: Completion);
}

impl<F> JobHandler for F
where
    F: Fn(Job, Completion) + Send + Sync + 'static,
{
    fn handle(&self, job: Job, done: Completion) {
        self(job, done)
    }
}

/// A named queue over a shared Redis instance.
///
/// Any number of processes may hold a `Queue` with the same name against the
/// same Redis database; they coordinate exclusively through the queue's keys.
/// Queues are created via [`crate::Convoy::create_queue`].
pub struct Queue {
    name: String,
    keys: Arc<QueueKeys>,
    client: redis::Client,
    conn: ConnectionManager,
    options: QueueOptions,
    log_ttl: Duration,
    concurrent_workers: usize,
    workers: Arc<Semaphore>,
    stopping: Arc<AtomicBool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    guard: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .field("options", &self.options)
            .field("log_ttl", &self.log_ttl)
            .field("concurrent_workers", &self.concurrent_workers)
            .finish()
    }
}

impl Queue {
    pub(crate) fn new(
        name: &str,
        options: QueueOptions,
        client: redis::Client,
        conn: ConnectionManager,
        config: &Config,
    ) -> ConvoyResult<Self> {
        if !keys::is_valid_name(name) {
            return Err(ConvoyError::InvalidQueueName(name.to_owned()));
        }
        let keys = Arc::new(QueueKeys::new(&config.keys.prefix, name));
        let concurrent_workers = options.concurrent_workers.max(1);
        Ok(Queue {
            name: name.to_owned(),
            keys,
            client,
            conn,
            options,
            log_ttl: config.keys.log_ttl.clone(),
            concurrent_workers,
            workers: Arc::new(Semaphore::new(concurrent_workers)),
            stopping: Arc::new(AtomicBool::new(false)),
            dispatcher: Mutex::new(None),
            guard: Mutex::new(None),
        })
    }

    /// Name of the queue.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit a job for admission.
    ///
    /// The committed set is the linearization point: of any number of
    /// producers racing on the same id, exactly one observes
    /// [`AddStatus::Added`] and enqueues the job; the rest are told where
    /// the id currently is and change nothing.
    pub async fn add_job(&self, job: &Job) -> ConvoyResult<AddStatus> {
        let mut conn = self.conn.clone();
        let added: bool = conn.sadd(&self.keys.committed, job.id()).await?;
        if added {
            let _: () = conn.rpush(&self.keys.queued, job.id()).await?;
            debug!("[{}] job {} added", self.keys.base, job);
            return Ok(AddStatus::Added);
        }

        // Leaving `processing` only ever removes an id, never re-adds it, so
        // a plain read is enough to tell the two no-op cases apart.
        let score: Option<i64> = conn.zscore(&self.keys.processing, job.id()).await?;
        if score.is_some() {
            Ok(AddStatus::Processing)
        } else {
            Ok(AddStatus::Committed)
        }
    }

    /// Start the dispatch loop, handing each popped job to `handler`.
    ///
    /// The loop runs on its own task until [`Queue::stop_processing`] or
    /// [`Queue::close`]. At most `concurrent_workers` jobs are in flight in
    /// this process at any moment; the loop does not pop while the pool is
    /// full. The blocking pop uses a dedicated connection so in-flight
    /// workers' writes are never queued behind it.
    ///
    /// A job popped here is marked processing as a second step; a process
    /// dying between the two leaves the id committed but untracked, and only
    /// a fresh [`Queue::add_job`] after jam clearing re-admits it.
    pub async fn start_processing<H: JobHandler>(&self, handler: H) -> ConvoyResult<()> {
        let mut slot = self.dispatcher.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                warn!("[{}] dispatch loop already running", self.keys.base);
                return Ok(());
            }
        }
        self.stopping.store(false, Ordering::SeqCst);

        let dispatcher = Dispatcher {
            keys: self.keys.clone(),
            pop_conn: self.client.get_tokio_connection_manager().await?,
            conn: self.conn.clone(),
            workers: self.workers.clone(),
            stopping: self.stopping.clone(),
            job_timeout: self.options.job_timeout.clone(),
            log_ttl: self.log_ttl.clone(),
        };
        *slot = Some(tokio::spawn(dispatch_loop(dispatcher, Arc::new(handler))));
        Ok(())
    }

    /// Ask the dispatch loop to exit after its current blocking pop
    /// resolves. Jobs already dispatched continue to run.
    pub fn stop_processing(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    /// Stop dispatching, wait for all in-flight workers to reach their
    /// terminal transitions, and stop the jam guard. Calling `close` on a
    /// queue that never processed, or closing twice, is a no-op.
    pub async fn close(&self) -> ConvoyResult<()> {
        self.stop_processing();
        if let Some(handle) = self.dispatcher.lock().await.take() {
            let _ = handle.await;
        }
        self.stop_jam_guard().await;

        // Every permit back in the pool means no worker is mid-transition.
        if let Ok(permits) = self.workers.acquire_many(self.concurrent_workers as u32).await {
            drop(permits);
        }
        info!("[{}] closed", self.keys.base);
        Ok(())
    }

    /// Release jobs that have sat in the processing set for at least
    /// `threshold`, removing them from both the processing and committed
    /// sets. Returns the released ids, which are then eligible for a fresh
    /// [`Queue::add_job`].
    pub async fn clear_jammed_jobs(&self, threshold: &Duration) -> ConvoyResult<Vec<String>> {
        let mut conn = self.conn.clone();
        clear_jammed(&mut conn, &self.keys, threshold).await
    }

    /// Start the recurring jam scan, running [`Queue::clear_jammed_jobs`]
    /// with the given threshold once per period and reporting each pass to
    /// `on_scan`. Scan failures are logged and the loop continues on the
    /// next tick. Stopped by [`Queue::stop_jam_guard`] or [`Queue::close`].
    pub async fn start_jam_guard<F>(&self, threshold: Duration, on_scan: F)
    where
        F: Fn(ConvoyResult<Vec<String>>) + Send + 'static,
    {
        let mut slot = self.guard.lock().await;
        if slot.is_some() {
            warn!("[{}] jam guard already running", self.keys.base);
            return;
        }

        let configured = self
            .options
            .jam_guard_interval
            .clone()
            .unwrap_or_else(|| threshold.clone());
        // a zero period is meaningless to the timer; scan once a second
        let period = if configured.is_zero() {
            Duration::from_secs(1)
        } else {
            configured
        };
        info!(
            "[{}] scanning for jobs jammed longer than {} every {}",
            self.keys.base, threshold, period
        );

        let mut conn = self.conn.clone();
        let keys = self.keys.clone();
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period.0);
            loop {
                interval.tick().await;
                let result = clear_jammed(&mut conn, &keys, &threshold).await;
                if let Err(ref err) = result {
                    error!("[{}] jam scan failed: {}", keys.base, err);
                }
                on_scan(result);
            }
        }));
    }

    /// Cancel the recurring jam scan, if one is running.
    pub async fn stop_jam_guard(&self) {
        if let Some(handle) = self.guard.lock().await.take() {
            handle.abort();
        }
    }

    /// Number of jobs waiting to be dispatched.
    pub async fn count_queued(&self) -> ConvoyResult<u64> {
        Ok(self.conn.clone().llen(&self.keys.queued).await?)
    }

    /// Number of jobs accepted and not yet terminated.
    pub async fn count_committed(&self) -> ConvoyResult<u64> {
        Ok(self.conn.clone().scard(&self.keys.committed).await?)
    }

    /// Number of jobs currently held by workers, across all processes.
    pub async fn count_processing(&self) -> ConvoyResult<u64> {
        Ok(self.conn.clone().zcard(&self.keys.processing).await?)
    }

    /// Number of jobs that terminated with an error.
    pub async fn count_failed(&self) -> ConvoyResult<u64> {
        Ok(self.conn.clone().zcard(&self.keys.failed).await?)
    }

    /// All four collection counts, read in one atomic step.
    pub async fn stats(&self) -> ConvoyResult<QueueStats> {
        let (queued, committed, processing, failed): (u64, u64, u64, u64) = redis::pipe()
            .atomic()
            .llen(&self.keys.queued)
            .scard(&self.keys.committed)
            .zcard(&self.keys.processing)
            .zcard(&self.keys.failed)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(QueueStats {
            queued,
            committed,
            processing,
            failed,
        })
    }

    /// Number of jobs currently in flight in this process.
    pub fn workers_running(&self) -> usize {
        self.concurrent_workers - self.workers.available_permits()
    }
}

/// Everything the dispatch loop needs, detached from the `Queue` so it can
/// live on its own task.
struct Dispatcher {
    keys: Arc<QueueKeys>,
    pop_conn: ConnectionManager,
    conn: ConnectionManager,
    workers: Arc<Semaphore>,
    stopping: Arc<AtomicBool>,
    job_timeout: Option<Duration>,
    log_ttl: Duration,
}

async fn dispatch_loop(mut d: Dispatcher, handler: Arc<dyn JobHandler>) {
    info!("[{}] dispatch loop started", d.keys.base);
    while !d.stopping.load(Ordering::SeqCst) {
        // Back-pressure: a permit is held for the whole life of a worker, so
        // no pop happens while the pool is full.
        let permit = match d.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        if d.stopping.load(Ordering::SeqCst) {
            break;
        }

        let popped: Option<(String, String)> =
            match d.pop_conn.blpop(&d.keys.queued, POP_WAIT_SECS).await {
                Ok(popped) => popped,
                Err(err) => {
                    error!("[{}] blocking pop failed: {}", d.keys.base, err);
                    drop(permit);
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    continue;
                }
            };
        let id = match popped {
            // empty wake-up; loop around and re-check the stop flag
            None => continue,
            Some((_, id)) => id,
        };

        let job = Job::new(&id);
        let mut worker = Worker::new(
            job.clone(),
            d.keys.clone(),
            d.conn.clone(),
            d.log_ttl.clone(),
            d.job_timeout.clone(),
        );
        if let Err(err) = worker.mark_processing().await {
            // the id is committed but in neither list now; it stays
            // unreachable until a producer re-adds it after jam clearing
            error!(
                "[{}] failed to mark job {} as processing: {}",
                d.keys.base, id, err
            );
            continue;
        }

        let (tx, rx) = oneshot::channel();
        let handler = handler.clone();
        let keys = d.keys.clone();
        tokio::spawn(async move {
            let _permit = permit;
            handler.handle(job, Completion::new(tx));
            if let Err(err) = worker.run(rx).await {
                error!("[{}] job {} state update failed: {}", keys.base, id, err);
            }
        });
    }
    info!("[{}] dispatch loop stopped", d.keys.base);
}

/// Remove every processing entry whose start time is at least `threshold`
/// old, together with its committed membership. The read and the removals
/// run under a transaction so a finishing worker retries us rather than
/// leaving a half-released id.
async fn clear_jammed(
    conn: &mut ConnectionManager,
    keys: &QueueKeys,
    threshold: &Duration,
) -> ConvoyResult<Vec<String>> {
    let cutoff = Timestamp::now().minus(threshold);
    let released: Vec<String> = transaction_async!(conn, &[&keys.processing], {
        let stale: Vec<String> = conn
            .zrangebyscore(&keys.processing, "-inf", cutoff.as_secs())
            .await?;
        if stale.is_empty() {
            Some(Vec::new())
        } else {
            let mut pipeline = redis::pipe();
            let pipe = pipeline.atomic();
            for id in &stale {
                pipe.zrem(&keys.processing, id)
                    .ignore()
                    .srem(&keys.committed, id)
                    .ignore();
            }
            let applied: Option<()> = pipe.query_async(conn).await?;
            applied.map(|_| stale)
        }
    });
    if !released.is_empty() {
        info!(
            "[{}] released {} jammed job(s): {:?}",
            keys.base,
            released.len(),
            released
        );
    }
    Ok(released)
}
