use crate::error::SyncResult;
use std::sync::Arc;
use wayfare_storage::{LocalStore, StorageResult};

/// Runs a store call on the blocking pool.
pub(crate) async fn with_store<T, F>(store: &Arc<LocalStore>, f: F) -> SyncResult<T>
where
    F: FnOnce(&LocalStore) -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    Ok(tokio::task::spawn_blocking(move || f(&store)).await??)
}
