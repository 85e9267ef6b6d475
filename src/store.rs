use std::sync::Arc;

use tokio::sync::RwLock;

use crate::types::ScanResult;

/// Holds the most recently completed scan for the export endpoints.
///
/// Results are swapped in whole as `Arc`s, so a reader sees either the old
/// scan or the new one and never a partially written result.
#[derive(Debug, Default)]
pub struct ScanStore {
    last: RwLock<Option<Arc<ScanResult>>>,
}

impl ScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored scan and return the shared handle to it.
    pub async fn replace(&self, result: ScanResult) -> Arc<ScanResult> {
        let result = Arc::new(result);
        *self.last.write().await = Some(result.clone());
        result
    }

    pub async fn latest(&self) -> Option<Arc<ScanResult>> {
        self.last.read().await.clone()
    }
}
