use thiserror::Error;

/// Error kinds surfaced by the scan pipeline and its collaborators.
///
/// `TransientProviderError` is retried internally by provider adapters and
/// should rarely escape to callers; it is part of the public enum so
/// adapters and the orchestrator agree on the taxonomy.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("transient provider error: {0}")]
    TransientProviderError(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("invalid or partial provider payload: {0}")]
    DataValidationError(String),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("a scan is already in progress")]
    ErrScanInProgress,

    #[error("scan cancelled: {0}")]
    Cancelled(String),

    #[error("fatal configuration error: {0}")]
    FatalConfigurationError(String),
}

impl ScanError {
    /// Whether this error kind is safe to record as a per-symbol failure
    /// without aborting the scan (spec §7 propagation policy).
    pub fn is_per_symbol(&self) -> bool {
        matches!(
            self,
            ScanError::ProviderError(_)
                | ScanError::DataValidationError(_)
                | ScanError::StoreError(_)
        )
    }
}
