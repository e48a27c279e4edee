use thiserror::Error;

/// Errors returned by smooth router operations.
///
/// Every variant carries only owned strings so that errors can be cloned into
/// orchestrator state events and approval outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmoothError {
    #[error("precision error: {0}")]
    Precision(String),

    #[error("range error: {0}")]
    Range(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("chain unavailable: {0}")]
    ChainUnavailable(String),

    #[error("approval denied: {0}")]
    ApprovalDenied(String),

    #[error("signing error: {0}")]
    Signing(String),

    /// `body` is the raw relay response, kept whole for diagnostics.
    #[error("relay rejected transfer{}: {reason}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    RelayRejected {
        status: Option<u16>,
        reason: String,
        body: String,
    },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("a transfer is already in flight for this session")]
    TransferInProgress,

    #[error("config error: {0}")]
    Config(String),

    #[error("approval cache error: {0}")]
    Cache(String),
}

/// Coarse failure tag carried by the orchestrator's `Failed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCause {
    Precision,
    Range,
    InvalidAddress,
    ChainUnavailable,
    ApprovalDenied,
    SigningFailed,
    RelayRejected,
    Timeout,
    TransferInProgress,
    Config,
    Cache,
}

impl SmoothError {
    pub fn cause(&self) -> FailureCause {
        match self {
            SmoothError::Precision(_) => FailureCause::Precision,
            SmoothError::Range(_) => FailureCause::Range,
            SmoothError::InvalidAddress(_) => FailureCause::InvalidAddress,
            SmoothError::ChainUnavailable(_) => FailureCause::ChainUnavailable,
            SmoothError::ApprovalDenied(_) => FailureCause::ApprovalDenied,
            SmoothError::Signing(_) => FailureCause::SigningFailed,
            SmoothError::RelayRejected { .. } => FailureCause::RelayRejected,
            SmoothError::Timeout(_) => FailureCause::Timeout,
            SmoothError::TransferInProgress => FailureCause::TransferInProgress,
            SmoothError::Config(_) => FailureCause::Config,
            SmoothError::Cache(_) => FailureCause::Cache,
        }
    }

    /// Input validation failures, raised before any chain interaction.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SmoothError::Precision(_) | SmoothError::Range(_) | SmoothError::InvalidAddress(_)
        )
    }
}
