// Route types
// This file defines the encoded, ready-to-submit call and the outcome
// of a quote selection round
//
// Numan Thabit 2025 Nov

use alloy_primitives::{Address, Bytes, U256};
use serde::Serialize;

use crate::errors::ErrorKind;
use crate::trade::VenueQuote;

/// A venue call ready for the broadcaster. One per trade; the deadline is baked into `calldata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedRoute {
    /// Router contract the call is sent to
    pub target: Address,
    pub calldata: Bytes,
    /// Native asset attached to the call (non-zero only when paying with the native token)
    pub native_value: U256,
    pub gas_limit: u64,
    /// Absolute unix deadline embedded in `calldata`
    pub deadline: u64,
}

/// A venue that did not contribute a usable quote.
#[derive(Debug, Clone, Serialize)]
pub struct VenueFailure {
    pub venue_id: String,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Outcome of one fan-out round
#[derive(Debug, Clone, Serialize)]
pub struct QuoteSelection {
    pub best: VenueQuote,
    /// Remaining successful quotes, best first
    pub alternatives: Vec<VenueQuote>,
    pub failures: Vec<VenueFailure>,
    pub venues_queried: usize,
}
