mod cost;
mod pricing;
mod record;
mod stats;
mod usage;

pub use cost::Cost;
pub use pricing::{ModelRates, PricingError, PricingTable, compute_cost};
pub use record::UsageRecord;
pub use stats::{DEFAULT_RECENT_LIMIT, UsagePoint, UsageStats, recent_series};
pub use usage::{TokenUsage, UsageInputError};
