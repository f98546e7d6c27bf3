use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when caller-supplied token counts cannot be accepted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UsageInputError {
    #[error("{field} must be non-negative (got {value})")]
    Negative { field: &'static str, value: i64 },
    #[error("{field} is too large (got {value})")]
    OutOfRange { field: &'static str, value: i64 },
}

/// Token counts reported by the completion API for a single call.
///
/// `total_tokens` is carried as reported; it is expected to equal
/// `prompt_tokens + completion_tokens` but that is not enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Build a usage triple whose total is the sum of its parts.
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Build a usage triple with an explicit, caller-reported total.
    #[must_use]
    pub fn with_total(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Convert signed counts (as decoded from JSON or CLI input) into a usage triple.
    ///
    /// # Errors
    ///
    /// Returns `UsageInputError` if any count is negative or exceeds `u32::MAX`.
    pub fn try_from_signed(
        prompt_tokens: i64,
        completion_tokens: i64,
        total_tokens: i64,
    ) -> Result<Self, UsageInputError> {
        Ok(Self {
            prompt_tokens: to_count("promptTokens", prompt_tokens)?,
            completion_tokens: to_count("completionTokens", completion_tokens)?,
            total_tokens: to_count("totalTokens", total_tokens)?,
        })
    }

    /// Returns true when the reported total matches prompt + completion.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        u64::from(self.prompt_tokens) + u64::from(self.completion_tokens)
            == u64::from(self.total_tokens)
    }
}

fn to_count(field: &'static str, value: i64) -> Result<u32, UsageInputError> {
    if value < 0 {
        return Err(UsageInputError::Negative { field, value });
    }
    u32::try_from(value).map_err(|_| UsageInputError::OutOfRange { field, value })
}
