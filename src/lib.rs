//! Distributed job queue backed by a shared Redis instance.
//!
//! Multiple independent worker processes ("convoys") cooperate on a single
//! named queue: any convoy may enqueue a job, and exactly one convoy will
//! execute it. Admission is deduplicated on job identity, dispatch is a
//! blocking pop with single delivery, in-flight work is tracked with start
//! timestamps, and a periodic jam guard releases jobs abandoned by crashed
//! workers. Delivery is at-least-once: a job whose worker vanishes becomes
//! eligible for re-admission once the jam guard has reclaimed it.
//!
//! All cross-process coordination rides on Redis primitives (sets, lists
//! with blocking pops, sorted sets, atomic pipelines); a queue is fully
//! reconstructible from its six Redis keys.

pub mod config;
pub mod convoy;
pub mod models;
pub mod queue;
pub mod redis_utils;

pub use config::Config;
pub use convoy::Convoy;
pub use models::{AddStatus, ConvoyError, ConvoyResult, Duration, Job, QueueStats, Timestamp};
pub use queue::{Completion, JobHandler, Queue, QueueOptions};
