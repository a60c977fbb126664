//! Contains definitions for the Redis keys composing a single queue.

use crate::models::Timestamp;

/// Suffix used with the queue's base key for the set of committed job ids.
/// Membership here is the linearization point for admission.
const COMMITTED_SUFFIX: &str = ":committed";

/// Suffix for the FIFO list of job ids ready to dispatch. Consumers take
/// from it with a blocking pop.
const QUEUED_SUFFIX: &str = ":queued";

/// Suffix for the sorted set of in-flight job ids. The score is the unix
/// second processing began, which is what jam detection runs on.
const PROCESSING_SUFFIX: &str = ":processing";

/// Suffix for the sorted set of failed job ids.
const FAILED_SUFFIX: &str = ":failed";

/// Suffix for per-day error log lists. The full key carries the unix second
/// of UTC midnight, e.g. "convoy:email:errorLog.1614556800".
const ERROR_LOG_SUFFIX: &str = ":errorLog.";

/// The Redis keys owned by one named queue.
///
/// A queue named `N` under configured prefix `P` has base key `PN`; the five
/// fixed keys hang off that, and error log keys are built per day. No other
/// persistent state exists, so a queue is fully reconstructible from these
/// keys.
#[derive(Clone, Debug)]
pub(crate) struct QueueKeys {
    /// Base key, `prefix + name`. Used as the logging context for the queue.
    pub base: String,

    /// Set of every job id accepted and not yet terminated.
    pub committed: String,

    /// List of job ids ready to dispatch.
    pub queued: String,

    /// Sorted set of in-flight job ids, scored by processing start time.
    pub processing: String,

    /// Sorted set of failed job ids, scored by failure time.
    pub failed: String,
}

impl QueueKeys {
    pub fn new(prefix: &str, name: &str) -> Self {
        let base = format!("{}{}", prefix, name);
        QueueKeys {
            committed: format!("{}{}", base, COMMITTED_SUFFIX),
            queued: format!("{}{}", base, QUEUED_SUFFIX),
            processing: format!("{}{}", base, PROCESSING_SUFFIX),
            failed: format!("{}{}", base, FAILED_SUFFIX),
            base,
        }
    }

    /// Key of the error log bucket for the day containing `day_start`.
    pub fn error_log(&self, day_start: Timestamp) -> String {
        format!("{}{}{}", self.base, ERROR_LOG_SUFFIX, day_start.as_secs())
    }
}

/// Validate queue name, allowed chars for names are: [a-zA-Z0-9_.-].
pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_layout() {
        let keys = QueueKeys::new("convoy:", "email");
        assert_eq!(keys.base, "convoy:email");
        assert_eq!(keys.committed, "convoy:email:committed");
        assert_eq!(keys.queued, "convoy:email:queued");
        assert_eq!(keys.processing, "convoy:email:processing");
        assert_eq!(keys.failed, "convoy:email:failed");
    }

    #[test]
    fn error_log_key_is_bucketed_by_day() {
        let keys = QueueKeys::new("convoy:", "email");
        let day = Timestamp::from_secs(1_614_605_831).day_start();
        assert_eq!(keys.error_log(day), "convoy:email:errorLog.1614556800");
    }

    #[test]
    fn empty_prefix() {
        let keys = QueueKeys::new("", "q");
        assert_eq!(keys.queued, "q:queued");
    }

    #[test]
    fn queue_name_validation() {
        assert!(is_valid_name("name"));
        assert!(is_valid_name("1"));
        assert!(is_valid_name("abc-123-ABC"));
        assert!(is_valid_name("123_456"));
        assert!(is_valid_name("name.1.low"));
        assert!(is_valid_name("_"));

        assert!(!is_valid_name(""));
        assert!(!is_valid_name("   "));
        assert!(!is_valid_name(":"));
        assert!(!is_valid_name("name "));
        assert!(!is_valid_name("name/name"));
        assert!(!is_valid_name("nâme"));
    }
}
