use serde::{Deserialize, Serialize};

use super::cost::Cost;
use super::usage::TokenUsage;

/// One completed API call: token counts, pricing tier, cost and creation time.
///
/// Records are immutable once created. The serialized shape is the persisted
/// ledger format: a flat camelCase object per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
    /// Milliseconds since the Unix epoch.
    timestamp: i64,
    model: String,
    cost: Cost,
}

impl UsageRecord {
    #[must_use]
    pub fn new(usage: TokenUsage, model: impl Into<String>, cost: Cost, timestamp: i64) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            timestamp,
            model: model.into(),
            cost,
        }
    }

    #[must_use]
    pub fn usage(&self) -> TokenUsage {
        TokenUsage::with_total(self.prompt_tokens, self.completion_tokens, self.total_tokens)
    }

    #[must_use]
    pub fn prompt_tokens(&self) -> u32 {
        self.prompt_tokens
    }

    #[must_use]
    pub fn completion_tokens(&self) -> u32 {
        self.completion_tokens
    }

    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.total_tokens
    }

    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn cost(&self) -> Cost {
        self.cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_shape_is_flat_camel_case() {
        let record = UsageRecord::new(
            TokenUsage::new(1000, 500),
            "gpt-3.5-turbo",
            Cost::from_ten_thousandths(13),
            1_700_000_000_000,
        );
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"promptTokens":1000,"completionTokens":500,"totalTokens":1500,"timestamp":1700000000000,"model":"gpt-3.5-turbo","cost":0.0013}"#
        );
    }

    #[test]
    fn reads_entries_written_by_the_browser_client() {
        let raw = r#"{"promptTokens":200,"completionTokens":100,"totalTokens":300,"timestamp":1700000000123,"model":"gpt-4","cost":0.012}"#;
        let record: UsageRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.model(), "gpt-4");
        assert_eq!(record.cost().to_string(), "0.0120");
        assert_eq!(record.usage(), TokenUsage::new(200, 100));
    }
}
