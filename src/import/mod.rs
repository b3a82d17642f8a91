pub mod engine;

pub use engine::ImportEngine;

/// Tuning knobs for the chunk driver. Defaults match a few seconds of work
/// per invocation on typical spreadsheet rows.
#[derive(Debug, Clone, Copy)]
pub struct ImportSettings {
    /// Rows processed per invocation.
    pub chunk_size: usize,
    /// Buffered records per destination write.
    pub batch_size: usize,
    /// Rows between incremental progress persists.
    pub progress_interval: usize,
    /// Maximum retained error_log entries per job.
    pub error_log_cap: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            chunk_size: 20_000,
            batch_size: 500,
            progress_interval: 1_000,
            error_log_cap: 100,
        }
    }
}
