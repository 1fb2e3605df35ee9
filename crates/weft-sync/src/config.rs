use weft_transport::MAX_ENTITY_BATCH;

/// Tuning knobs for the sync engine.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Maximum concurrent download workers during a pull.
    pub download_workers: usize,
    /// Entities per upload/download request. May be tuned below
    /// [`MAX_ENTITY_BATCH`], never above it without server coordination.
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            download_workers: 10,
            batch_size: MAX_ENTITY_BATCH,
        }
    }
}
