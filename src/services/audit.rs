use serde_json::Value;

use crate::db::Repository;

/// Append an admin audit row. Failures are logged and never reach the caller.
pub async fn record(repository: &Repository, action: &str, meta: Value) {
    if let Err(e) = repository.insert_audit(action, meta).await {
        tracing::warn!("Failed to write audit entry {}: {}", action, e);
    }
}
