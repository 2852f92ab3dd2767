//! Timeout wrapper for model calls.

use std::future::Future;
use std::time::Duration;

use crate::types::ModelError;

/// Wrap an async operation with a timeout, mapping elapse to a typed
/// transient model failure.
pub async fn with_timeout<F, T>(
    duration: Duration,
    operation: F,
    name: &str,
) -> std::result::Result<T, ModelError>
where
    F: Future<Output = std::result::Result<T, ModelError>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => Err(ModelError::timeout(name, duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelErrorKind;

    #[tokio::test]
    async fn test_timeout_maps_to_transient_error() {
        let result: std::result::Result<(), ModelError> = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            "generation",
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ModelErrorKind::Timeout);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fast_operation_passes_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok(42u32) }, "fast").await;
        assert_eq!(result.unwrap(), 42);
    }
}
