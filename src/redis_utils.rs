//! Miscellaneous Redis utilities and helper functions.

/// Helper macro for performing transactions in Redis over an async connection.
///
/// Watches the given keys, then evaluates a block that builds and executes an
/// atomic pipeline. The block must evaluate to an `Option<T>`: `Some(T)` means
/// the transaction applied and the value is returned, `None` means a watched
/// key was modified before `EXEC` and the whole block is retried.
#[macro_export]
macro_rules! transaction_async {
    ($conn:expr, $keys:expr, $body:expr) => {
        loop {
            redis::cmd("WATCH")
                .arg($keys)
                .query_async::<_, ()>($conn)
                .await?;
            if let Some(result) = $body {
                redis::cmd("UNWATCH").query_async::<_, ()>($conn).await?;
                break result;
            }
        }
    };
}
