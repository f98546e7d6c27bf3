#![forbid(unsafe_code)]

pub mod error;
pub mod ledger;

pub use usage_core::Clock;

pub use error::LedgerError;
pub use ledger::{DEFAULT_STORAGE_KEY, LedgerOptions, UsageLedger};
