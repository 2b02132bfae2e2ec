//! Utility functions

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ReconcilerError;

/// Version information for the reconciler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Run an adapter call under a deadline; an expired deadline is a transport failure
pub async fn with_timeout<T, F>(
    timeout: Duration,
    what: &str,
    fut: F,
) -> Result<T, ReconcilerError>
where
    F: Future<Output = Result<T, ReconcilerError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ReconcilerError::TransportError(format!(
            "{} timed out after {}s",
            what,
            timeout.as_secs_f64()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_maps_to_transport_error() {
        let result: Result<(), _> = with_timeout(Duration::from_secs(1), "probe", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ReconcilerError::TransportError(_))));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(Duration::from_secs(1), "probe", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
