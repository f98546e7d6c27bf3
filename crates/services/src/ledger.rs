use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::Clock;
use crate::error::LedgerError;
use storage::{KeyValueStore, StorageError};
use usage_core::model::{
    Cost, PricingTable, TokenUsage, UsagePoint, UsageRecord, UsageStats, compute_cost,
    recent_series,
};

/// Storage key the browser client used for its history blob.
pub const DEFAULT_STORAGE_KEY: &str = "token_history";

#[derive(Clone, Debug)]
pub struct LedgerOptions {
    pub storage_key: String,
    /// Keep at most this many records, dropping the oldest. `None` keeps everything.
    pub max_records: Option<NonZeroUsize>,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            max_records: None,
        }
    }
}

/// Append-only usage history persisted as one JSON array under a single key.
///
/// Every operation re-reads the store, so a write is visible to the next read.
/// Appends and resets go through [`KeyValueStore::update`], so ledgers sharing
/// a store (clones, separate instances or separate processes on one `SQLite`
/// file) never overwrite each other's records.
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn KeyValueStore>,
    pricing: Arc<PricingTable>,
    clock: Clock,
    options: LedgerOptions,
}

impl UsageLedger {
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        pricing: PricingTable,
        clock: Clock,
        options: LedgerOptions,
    ) -> Self {
        Self {
            store,
            pricing: Arc::new(pricing),
            clock,
            options,
        }
    }

    /// Cost of a call at the table's rates (default tier for unknown models).
    #[must_use]
    pub fn compute_cost(&self, usage: &TokenUsage, model: &str) -> Cost {
        compute_cost(&self.pricing, usage, model)
    }

    /// Price a completed call, append it to the history and persist the whole history.
    ///
    /// The reported `total_tokens` is stored as given.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::MalformedPersistedData` if the stored history cannot
    /// be parsed (it is left untouched), `LedgerError::Storage` if the store
    /// cannot be read, or `LedgerError::PersistenceWriteFailure` carrying the
    /// computed record if the store rejects the write.
    pub async fn record_usage(
        &self,
        usage: TokenUsage,
        model: &str,
    ) -> Result<UsageRecord, LedgerError> {
        if !usage.is_consistent() {
            warn!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "reported total does not match prompt + completion"
            );
        }
        if !self.pricing.contains(model) {
            debug!(
                model,
                default_model = self.pricing.default_model(),
                "pricing unknown model at the default tier"
            );
        }

        let key = self.options.storage_key.as_str();
        let mut prepared: Option<Result<(UsageRecord, usize), LedgerError>> = None;
        let written = self
            .store
            .update(
                key,
                Box::new(|current: Option<String>| {
                    match self.append_to(key, current.as_deref(), usage, model) {
                        Ok((appended, encoded)) => {
                            prepared = Some(Ok(appended));
                            Some(encoded)
                        }
                        Err(err) => {
                            prepared = Some(Err(err));
                            None
                        }
                    }
                }),
            )
            .await;

        match (prepared, written) {
            (Some(Err(err)), _) => Err(err),
            (Some(Ok((record, _))), Err(source)) => {
                let cost = record.cost();
                warn!(model, %cost, error = %source, "usage record not persisted");
                Err(LedgerError::PersistenceWriteFailure {
                    record: Box::new(record),
                    source,
                })
            }
            (Some(Ok((record, len))), Ok(_)) => {
                info!(
                    model,
                    cost = %record.cost(),
                    total_tokens = record.total_tokens(),
                    records = len,
                    "recorded usage"
                );
                Ok(record)
            }
            (None, Err(err)) => Err(LedgerError::Storage(err)),
            (None, Ok(_)) => Err(LedgerError::Storage(StorageError::Unavailable(
                "store skipped the update".into(),
            ))),
        }
    }

    /// Validate signed counts and record them.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidUsageInput` for negative or oversized counts,
    /// otherwise the errors of [`UsageLedger::record_usage`].
    pub async fn record_signed_usage(
        &self,
        prompt_tokens: i64,
        completion_tokens: i64,
        total_tokens: i64,
        model: &str,
    ) -> Result<UsageRecord, LedgerError> {
        let usage = TokenUsage::try_from_signed(prompt_tokens, completion_tokens, total_tokens)?;
        self.record_usage(usage, model).await
    }

    /// Full history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::MalformedPersistedData` if the stored history cannot
    /// be parsed, or `LedgerError::Storage` if the store cannot be read.
    pub async fn history(&self) -> Result<Vec<UsageRecord>, LedgerError> {
        let key = self.options.storage_key.as_str();
        let raw = self.store.get(key).await?;
        if raw.is_none() {
            debug!(key, "no usage history stored");
        }
        parse_records(key, raw.as_deref())
    }

    /// Aggregate statistics over the full history.
    ///
    /// # Errors
    ///
    /// Same as [`UsageLedger::history`].
    pub async fn stats(&self) -> Result<UsageStats, LedgerError> {
        let records = self.history().await?;
        Ok(UsageStats::from_records(&records))
    }

    /// The newest `limit` calls as chart points, oldest first.
    ///
    /// # Errors
    ///
    /// Same as [`UsageLedger::history`].
    pub async fn recent(&self, limit: usize) -> Result<Vec<UsagePoint>, LedgerError> {
        let records = self.history().await?;
        Ok(recent_series(&records, limit))
    }

    /// Replace the history with an empty one, returning how many records were dropped.
    ///
    /// A malformed history is discarded too (and counted as zero records).
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Storage` if the store cannot be read or written.
    pub async fn reset(&self) -> Result<usize, LedgerError> {
        let key = self.options.storage_key.as_str();
        let mut discarded = 0;
        self.store
            .update(
                key,
                Box::new(|current: Option<String>| {
                    discarded = match parse_records(key, current.as_deref()) {
                        Ok(records) => records.len(),
                        Err(err) => {
                            warn!(key = %key, error = %err, "discarding malformed usage history");
                            0
                        }
                    };
                    Some("[]".to_string())
                }),
            )
            .await?;

        info!(discarded, "usage history reset");
        Ok(discarded)
    }

    // Runs inside the store's update: the new record, the resulting history
    // length, and the encoded history to write back.
    fn append_to(
        &self,
        key: &str,
        current: Option<&str>,
        usage: TokenUsage,
        model: &str,
    ) -> Result<((UsageRecord, usize), String), LedgerError> {
        let mut records = parse_records(key, current)?;

        let cost = self.compute_cost(&usage, model);
        let record = UsageRecord::new(usage, model, cost, self.clock.now_millis());
        records.push(record.clone());

        if let Some(max) = self.options.max_records {
            let excess = records.len().saturating_sub(max.get());
            if excess > 0 {
                records.drain(..excess);
                debug!(dropped = excess, max = max.get(), "trimmed usage history");
            }
        }

        let encoded = serde_json::to_string(&records).map_err(LedgerError::Encode)?;
        Ok(((record, records.len()), encoded))
    }
}

fn parse_records(key: &str, raw: Option<&str>) -> Result<Vec<UsageRecord>, LedgerError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(raw).map_err(|source| LedgerError::MalformedPersistedData {
        key: key.to_string(),
        source,
    })
}
