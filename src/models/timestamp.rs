//! Defines custom `Timestamp` type.

use std::fmt;

use redis::{self, FromRedisValue, RedisResult, ToRedisArgs};

use super::Duration;

const SECONDS_PER_DAY: i64 = 86_400;

/// Wall-clock time as whole unix seconds.
///
/// Second resolution is all the queue's bookkeeping needs, and it keeps
/// sorted set scores as plain integers in Redis.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Get the current time, floored to whole seconds.
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp())
    }

    /// Create a new Timestamp from given number of unix seconds.
    pub fn from_secs(seconds: i64) -> Self {
        Timestamp(seconds)
    }

    /// Get this timestamp as number of unix seconds.
    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// UTC midnight of the day this timestamp falls in. Used to bucket
    /// error logs per day.
    pub fn day_start(&self) -> Self {
        Timestamp(self.0 - self.0.rem_euclid(SECONDS_PER_DAY))
    }

    /// This timestamp moved back by the given duration, saturating at zero.
    pub fn minus(&self, duration: &Duration) -> Self {
        Timestamp((self.0 - duration.as_secs() as i64).max(0))
    }
}

impl FromRedisValue for Timestamp {
    fn from_redis_value(v: &redis::Value) -> RedisResult<Self> {
        let seconds: i64 = redis::from_redis_value(v)?;
        Ok(Timestamp(seconds))
    }
}

impl ToRedisArgs for Timestamp {
    fn write_redis_args<W: ?Sized + redis::RedisWrite>(&self, out: &mut W) {
        self.0.write_redis_args(out)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn day_start() {
        // 2021-03-01T00:00:00Z
        let midnight = Timestamp::from_secs(1_614_556_800);
        assert_eq!(midnight.day_start(), midnight);

        // 2021-03-01T13:37:11Z
        let afternoon = Timestamp::from_secs(1_614_605_831);
        assert_eq!(afternoon.day_start(), midnight);

        // one second before the next midnight still buckets to the same day
        let last = Timestamp::from_secs(1_614_556_800 + 86_399);
        assert_eq!(last.day_start(), midnight);
    }

    #[test]
    fn minus() {
        let ts = Timestamp::from_secs(100);
        assert_eq!(ts.minus(&Duration::from_secs(40)), Timestamp::from_secs(60));
        assert_eq!(ts.minus(&Duration::from_secs(0)), ts);
        assert_eq!(ts.minus(&Duration::from_secs(1000)), Timestamp::from_secs(0));
    }

    #[test]
    fn redis_value_roundtrip() {
        let ts = Timestamp::from_redis_value(&redis::Value::Int(42)).unwrap();
        assert_eq!(ts, Timestamp::from_secs(42));

        let ts = Timestamp::from_redis_value(&redis::Value::Data(b"1614556800".to_vec())).unwrap();
        assert_eq!(ts.as_secs(), 1_614_556_800);
    }
}
