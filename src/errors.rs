// Error types and error handling module
// This file defines the error taxonomy shared by venues, the aggregator
// and the execution coordinator, plus the stable kind codes exposed to callers
//
// Numan Thabit 2025 Nov

use alloy_primitives::TxHash;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggrError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("config error: {0}")]
    Config(String),

    // Recovered inside the aggregator; never surfaced per venue.
    #[error("venue {venue} timed out after {timeout_ms}ms")]
    VenueTimeout { venue: String, timeout_ms: u64 },
    #[error("venue {venue} failed: {reason}")]
    Venue { venue: String, reason: String },

    #[error("no venue returned a usable quote")]
    NoLiquidity,
    #[error("slippage {0} bps outside [0, 5000]")]
    InvalidSlippage(u32),
    #[error("unsupported venue: {0}")]
    UnsupportedVenue(String),
    #[error("price impact {impact_bps} bps exceeds limit of {max_bps} bps")]
    PriceImpactExceeded { impact_bps: u32, max_bps: u32 },
    #[error("execution already in flight for request {0}")]
    AlreadyExecuting(String),
    #[error("quote does not match request: {0}")]
    QuoteMismatch(String),
    #[error("amount overflows 256-bit arithmetic")]
    AmountOverflow,
    #[error("build tx error: {0}")]
    BuildTx(String),

    #[error("submission failed: {0}")]
    SubmissionFailed(String),
    #[error("transaction {tx} not confirmed within {timeout_ms}ms")]
    TransactionTimeout { tx: TxHash, timeout_ms: u64 },
    #[error("transaction {tx} reverted")]
    TransactionReverted { tx: TxHash },
}

/// Stable, caller-facing classification of an [`AggrError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Provider,
    Config,
    VenueTimeout,
    VenueError,
    NoLiquidity,
    InvalidSlippage,
    UnsupportedVenue,
    PriceImpactExceeded,
    AlreadyExecuting,
    QuoteMismatch,
    AmountOverflow,
    BuildTx,
    SubmissionFailed,
    TransactionTimeout,
    TransactionReverted,
}

impl ErrorKind {
    /// Same code as the serialized form; used for metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Provider => "provider",
            Self::Config => "config",
            Self::VenueTimeout => "venue_timeout",
            Self::VenueError => "venue_error",
            Self::NoLiquidity => "no_liquidity",
            Self::InvalidSlippage => "invalid_slippage",
            Self::UnsupportedVenue => "unsupported_venue",
            Self::PriceImpactExceeded => "price_impact_exceeded",
            Self::AlreadyExecuting => "already_executing",
            Self::QuoteMismatch => "quote_mismatch",
            Self::AmountOverflow => "amount_overflow",
            Self::BuildTx => "build_tx",
            Self::SubmissionFailed => "submission_failed",
            Self::TransactionTimeout => "transaction_timeout",
            Self::TransactionReverted => "transaction_reverted",
        }
    }
}

impl AggrError {
    pub fn venue(venue: impl Into<String>, reason: impl ToString) -> Self {
        Self::Venue {
            venue: venue.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Provider(_) => ErrorKind::Provider,
            Self::Config(_) => ErrorKind::Config,
            Self::VenueTimeout { .. } => ErrorKind::VenueTimeout,
            Self::Venue { .. } => ErrorKind::VenueError,
            Self::NoLiquidity => ErrorKind::NoLiquidity,
            Self::InvalidSlippage(_) => ErrorKind::InvalidSlippage,
            Self::UnsupportedVenue(_) => ErrorKind::UnsupportedVenue,
            Self::PriceImpactExceeded { .. } => ErrorKind::PriceImpactExceeded,
            Self::AlreadyExecuting(_) => ErrorKind::AlreadyExecuting,
            Self::QuoteMismatch(_) => ErrorKind::QuoteMismatch,
            Self::AmountOverflow => ErrorKind::AmountOverflow,
            Self::BuildTx(_) => ErrorKind::BuildTx,
            Self::SubmissionFailed(_) => ErrorKind::SubmissionFailed,
            Self::TransactionTimeout { .. } => ErrorKind::TransactionTimeout,
            Self::TransactionReverted { .. } => ErrorKind::TransactionReverted,
        }
    }

    /// Errors that end the execution state machine after a transaction was handed off.
    pub fn is_terminal_execution_failure(&self) -> bool {
        matches!(
            self,
            Self::TransactionTimeout { .. } | Self::TransactionReverted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_as_snake_case() {
        let kind = AggrError::PriceImpactExceeded {
            impact_bps: 600,
            max_bps: 500,
        }
        .kind();
        assert_eq!(
            serde_json::to_string(&kind).unwrap(),
            "\"price_impact_exceeded\""
        );
        assert_eq!(
            serde_json::to_string(&AggrError::venue("v2", "no pair").kind()).unwrap(),
            "\"venue_error\""
        );
        let kind = ErrorKind::TransactionTimeout;
        assert_eq!(
            serde_json::to_string(&kind).unwrap(),
            format!("\"{}\"", kind.as_str())
        );
    }

    #[test]
    fn only_timeouts_and_reverts_are_terminal() {
        let tx = TxHash::ZERO;
        let timeout = AggrError::TransactionTimeout { tx, timeout_ms: 10 };
        assert!(timeout.is_terminal_execution_failure());
        assert!(AggrError::TransactionReverted { tx }.is_terminal_execution_failure());
        assert!(!AggrError::NoLiquidity.is_terminal_execution_failure());
        assert!(!AggrError::AlreadyExecuting("k".into()).is_terminal_execution_failure());
    }
}
