use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        available: Decimal,
        required: Decimal,
    },
    #[error("Insufficient supply: {remaining} tokens remaining, {requested} requested")]
    InsufficientSupply { remaining: u64, requested: u64 },
    #[error("Reservation {0} has expired")]
    ReservationExpired(Uuid),
    #[error("Insufficient approvals: {approvals} of {threshold} required")]
    InsufficientApprovals { approvals: usize, threshold: usize },
    #[error("Wallet for user {0} is frozen")]
    WalletFrozen(Uuid),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error("Ledger error: {0}")]
    Ledger(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PlatformError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Conditions the caller can act on (top up, retry later, pick a smaller
    /// amount). Everything else is surfaced as a generic failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::NotFound { .. }
                | Self::Conflict(_)
                | Self::InvalidState(_)
                | Self::Unauthorized(_)
                | Self::InsufficientBalance { .. }
                | Self::InsufficientSupply { .. }
                | Self::ReservationExpired(_)
                | Self::InsufficientApprovals { .. }
                | Self::WalletFrozen(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
