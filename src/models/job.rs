//! Defines the `Job` identity type and admission statuses.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A unit of work submitted to a queue.
///
/// A job is identified by an opaque string; any identifier that can be
/// rendered as a string is accepted, since Redis treats ids as strings
/// either way. Identity is the sole basis of deduplication: two jobs with
/// the same id are the same job, whatever their payloads.
#[derive(Clone, Debug)]
pub struct Job {
    id: String,
    payload: Option<serde_json::Value>,
}

impl Job {
    /// Create a new job with given identifier and no payload.
    pub fn new<S: ToString>(id: S) -> Self {
        Job {
            id: id.to_string(),
            payload: None,
        }
    }

    /// Create a new job carrying opaque payload metadata.
    ///
    /// The payload rides along inside this process only; it is not written
    /// to Redis and does not take part in deduplication.
    pub fn with_payload<S: ToString>(id: S, payload: serde_json::Value) -> Self {
        Job {
            id: id.to_string(),
            payload: Some(payload),
        }
    }

    /// Get this job's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get this job's payload metadata, if any.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Job) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl Hash for Job {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Outcome of submitting a job for admission.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddStatus {
    /// The id was new: the job has been committed and queued for dispatch.
    Added,

    /// The id was already committed but not yet picked up by a worker; the
    /// submission was a no-op.
    Committed,

    /// The id is currently held by a worker; the submission was a no-op.
    Processing,
}

impl fmt::Display for AddStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AddStatus::Added => "added",
            AddStatus::Committed => "committed",
            AddStatus::Processing => "processing",
        };
        write!(f, "{}", s)
    }
}
