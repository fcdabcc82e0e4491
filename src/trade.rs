// Trade request and venue quote types
// This file defines what a caller asks for and what a venue answers with
//
// Numan Thabit 2025 Nov

use alloy_primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};

/// Sentinel used by callers to denote the chain's native asset (ETH, MATIC, ...).
pub const NATIVE_TOKEN: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    /// `amount` is spent exactly; the received amount is bounded from below.
    ExactInput,
    /// `amount` is received exactly; the spent amount is bounded from above.
    ExactOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub input_token: Address,
    pub output_token: Address,
    /// Base units of the fixed side (input for ExactInput, output for ExactOutput)
    pub amount: U256,
    pub slippage_bps: u32,
    pub deadline_seconds: u64,
    pub recipient: Address,
    pub direction: TradeDirection,
    /// Caller-supplied idempotency key
    #[serde(default)]
    pub request_id: Option<String>,
}

impl TradeRequest {
    pub fn idempotency_key(&self) -> String {
        match &self.request_id {
            Some(id) => id.clone(),
            None => format!(
                "{}:{}:{}:{}:{:?}",
                self.recipient, self.input_token, self.output_token, self.amount, self.direction
            ),
        }
    }

    pub fn is_native_input(&self) -> bool {
        self.input_token == NATIVE_TOKEN
    }

    pub fn is_native_output(&self) -> bool {
        self.output_token == NATIVE_TOKEN
    }
}

/// Venue-internal routing data carried from quoting to encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum RouteHint {
    /// Ordered token path through constant-product pairs, no per-hop fee tier
    ConstantProduct { path: Vec<Address> },
    /// Single pool identified by its token pair and fee tier (hundredths of a bp)
    ConcentratedLiquidity {
        token_in: Address,
        token_out: Address,
        fee_tier: u32,
    },
}

impl RouteHint {
    pub fn family(&self) -> ProtocolFamily {
        match self {
            Self::ConstantProduct { .. } => ProtocolFamily::ConstantProduct,
            Self::ConcentratedLiquidity { .. } => ProtocolFamily::ConcentratedLiquidity,
        }
    }

    /// First and last token of the route, as held by the pools.
    pub fn endpoints(&self) -> Option<(Address, Address)> {
        match self {
            Self::ConstantProduct { path } => Some((*path.first()?, *path.last()?)),
            Self::ConcentratedLiquidity {
                token_in,
                token_out,
                ..
            } => Some((*token_in, *token_out)),
        }
    }

    pub fn hops(&self) -> usize {
        match self {
            Self::ConstantProduct { path } => path.len().saturating_sub(1),
            Self::ConcentratedLiquidity { .. } => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolFamily {
    ConstantProduct,
    ConcentratedLiquidity,
}

impl std::fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConstantProduct => write!(f, "constant_product"),
            Self::ConcentratedLiquidity => write!(f, "concentrated_liquidity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueQuote {
    pub venue_id: String,
    pub input_amount: U256,
    pub output_amount: U256,
    pub estimated_gas: u64,
    pub price_impact_bps: u32,
    pub route_hint: RouteHint,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(request_id: Option<&str>) -> TradeRequest {
        TradeRequest {
            input_token: Address::repeat_byte(0x11),
            output_token: Address::repeat_byte(0x22),
            amount: U256::from(1_000_000u64),
            slippage_bps: 50,
            deadline_seconds: 600,
            recipient: Address::repeat_byte(0x33),
            direction: TradeDirection::ExactInput,
            request_id: request_id.map(str::to_string),
        }
    }

    #[test]
    fn explicit_request_id_is_the_key() {
        assert_eq!(request(Some("abc")).idempotency_key(), "abc");
    }

    #[test]
    fn derived_key_is_stable_and_direction_sensitive() {
        let a = request(None);
        let mut b = request(None);
        assert_eq!(a.idempotency_key(), b.idempotency_key());
        b.direction = TradeDirection::ExactOutput;
        assert_ne!(a.idempotency_key(), b.idempotency_key());
    }

    #[test]
    fn hops_follow_route_shape() {
        let path = RouteHint::ConstantProduct {
            path: vec![Address::ZERO, Address::repeat_byte(1), Address::repeat_byte(2)],
        };
        assert_eq!(path.hops(), 2);
        let single = RouteHint::ConcentratedLiquidity {
            token_in: Address::ZERO,
            token_out: Address::repeat_byte(1),
            fee_tier: 3000,
        };
        assert_eq!(single.hops(), 1);
        assert_eq!(path.endpoints(), Some((Address::ZERO, Address::repeat_byte(2))));
        assert_eq!(RouteHint::ConstantProduct { path: vec![] }.endpoints(), None);
        assert_eq!(single.family(), ProtocolFamily::ConcentratedLiquidity);
    }

    #[test]
    fn route_hint_is_tagged_by_family() {
        let hint = RouteHint::ConcentratedLiquidity {
            token_in: Address::ZERO,
            token_out: Address::ZERO,
            fee_tier: 500,
        };
        let json = serde_json::to_value(&hint).unwrap();
        assert_eq!(json["family"], "concentrated_liquidity");
        assert_eq!(json["fee_tier"], 500);
    }
}
