//! Engine error taxonomy
//!
//! Every rejection leaves ledger state untouched; multi-entity writes only
//! ever reach the store through an atomic batch commit.

use uuid::Uuid;

use crate::feed::FeedError;
use crate::store::StoreError;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad input or business precondition failed on the caller's side.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested odds no longer appear on the live ladder. The caller
    /// should refresh prices and retry.
    #[error("requested odds are no longer available")]
    StalePrice,

    /// The user's balance cannot cover the exposure the wager would add.
    #[error("insufficient balance to cover exposure")]
    InsufficientBalance,

    /// The wager would push exposure past the account's hard ceiling.
    #[error("exposure limit exceeded")]
    ExposureLimitExceeded,

    /// The market (or its runner) already has a declared result or is
    /// suspended and cannot accept wagers.
    #[error("market is closed for betting")]
    MarketClosed,

    /// A result has already been declared; an explicit reversal is required
    /// before settling again.
    #[error("result already declared")]
    AlreadySettled,

    /// Reversal requested on a market with no declared result.
    #[error("no declared result to revert")]
    ResultNotDeclared,

    #[error("{0} not found: {1}")]
    NotFound(&'static str, Uuid),

    /// The odds feed timed out or failed; safe to retry.
    #[error("market data unavailable")]
    MarketDataUnavailable,

    /// Version contention persisted past the engine's internal retries.
    #[error("concurrent modification, retry the operation")]
    ConcurrencyConflict,

    /// The ledger store failed; nothing was committed.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    /// Whether the caller can safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StalePrice
                | EngineError::MarketDataUnavailable
                | EngineError::ConcurrencyConflict
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => EngineError::ConcurrencyConflict,
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<FeedError> for EngineError {
    fn from(_: FeedError) -> Self {
        EngineError::MarketDataUnavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_maps_to_concurrency_conflict() {
        let err: EngineError = StoreError::VersionConflict {
            user_id: Uuid::new_v4(),
        }
        .into();
        assert!(matches!(err, EngineError::ConcurrencyConflict));
        assert!(err.is_retryable());
    }

    #[test]
    fn backend_failure_maps_to_storage() {
        let err: EngineError = StoreError::Backend("connection reset".into()).into();
        assert!(matches!(err, EngineError::Storage(_)));
        assert!(!err.is_retryable());
    }
}
