//! Data structures used throughout the crate.

mod duration;
mod error;
mod job;
mod timestamp;

pub use self::duration::Duration;
pub use self::error::{ConvoyError, ConvoyResult};
pub use self::job::{AddStatus, Job};
pub use self::timestamp::Timestamp;

use serde::Serialize;

/// Point-in-time counts of a single queue's collections, as seen through one
/// convoy's connection.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct QueueStats {
    /// Jobs waiting to be dispatched.
    pub queued: u64,

    /// Jobs accepted and not yet terminated (includes queued and processing).
    pub committed: u64,

    /// Jobs currently held by some worker.
    pub processing: u64,

    /// Jobs that terminated with an error.
    pub failed: u64,
}
