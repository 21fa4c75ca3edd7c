//! Timeout helpers
//!
//! Wraps async operations with `tokio::time::timeout` and converts expiry
//! into `ForgeError::Timeout`, so callers treat it like any other failure.

use std::future::Future;
use std::time::Duration;

use crate::types::{ForgeError, Result};

/// Execute an async operation with a timeout
///
/// Returns a timeout error if the operation doesn't complete within the specified duration.
///
/// ```ignore
/// let summary = with_timeout(
///     Duration::from_secs(300),
///     executor.run(&task),
///     "analysis task",
/// )
/// .await?;
/// ```
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(ForgeError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, ForgeError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ForgeError>(42)
            },
            "slow operation",
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, ForgeError::Timeout { .. }));
        assert!(err.to_string().contains("slow operation"));
    }
}
