use thiserror::Error;

use services::LedgerError;
use storage::sqlite::SqliteInitError;
use usage_core::model::{PricingError, UsageInputError};

/// Errors surfaced to the binary boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),
    #[error("invalid --db value: {raw}")]
    InvalidDbUrl { raw: String },
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error(transparent)]
    UsageInput(#[from] UsageInputError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
