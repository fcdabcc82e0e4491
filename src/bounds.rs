// Slippage bounds module
// This file derives minimum-output and maximum-input limits from a venue quote
// using integer base-unit arithmetic only
//
// Numan Thabit 2025 Nov

use alloy_primitives::U256;
use serde::Serialize;

use crate::errors::AggrError;
use crate::trade::VenueQuote;

pub const BPS_DENOMINATOR: u32 = 10_000;
pub const MAX_SLIPPAGE_BPS: u32 = 5_000;

/// A quote together with the limits that are enforced on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundedQuote {
    pub quote: VenueQuote,
    /// Never above `quote.output_amount`
    pub min_output: U256,
    /// Never below `quote.input_amount`
    pub max_input: U256,
}

pub fn validate_slippage(slippage_bps: u32) -> Result<(), AggrError> {
    if slippage_bps > MAX_SLIPPAGE_BPS {
        return Err(AggrError::InvalidSlippage(slippage_bps));
    }
    Ok(())
}

pub fn compute_bounds(quote: &VenueQuote, slippage_bps: u32) -> Result<BoundedQuote, AggrError> {
    Ok(BoundedQuote {
        min_output: min_output(quote.output_amount, slippage_bps)?,
        max_input: max_input(quote.input_amount, slippage_bps)?,
        quote: quote.clone(),
    })
}

/// floor(amount * (10000 - s) / 10000)
pub fn min_output(amount: U256, slippage_bps: u32) -> Result<U256, AggrError> {
    validate_slippage(slippage_bps)?;
    let scaled = amount
        .checked_mul(U256::from(BPS_DENOMINATOR - slippage_bps))
        .ok_or(AggrError::AmountOverflow)?;
    Ok(scaled / U256::from(BPS_DENOMINATOR))
}

/// ceil(amount * (10000 + s) / 10000)
pub fn max_input(amount: U256, slippage_bps: u32) -> Result<U256, AggrError> {
    validate_slippage(slippage_bps)?;
    let scaled = amount
        .checked_mul(U256::from(BPS_DENOMINATOR + slippage_bps))
        .ok_or(AggrError::AmountOverflow)?;
    let denominator = U256::from(BPS_DENOMINATOR);
    let quotient = scaled / denominator;
    if scaled % denominator == U256::ZERO {
        Ok(quotient)
    } else {
        Ok(quotient + U256::from(1u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::RouteHint;
    use alloy_primitives::Address;

    fn quote(input: u64, output: u64) -> VenueQuote {
        VenueQuote {
            venue_id: "v2".into(),
            input_amount: U256::from(input),
            output_amount: U256::from(output),
            estimated_gas: 120_000,
            price_impact_bps: 5,
            route_hint: RouteHint::ConstantProduct {
                path: vec![Address::repeat_byte(1), Address::repeat_byte(2)],
            },
        }
    }

    #[test]
    fn fifty_bps_on_two_units() {
        let bounded = compute_bounds(&quote(1_000_000, 2_000_000), 50).unwrap();
        assert_eq!(bounded.min_output, U256::from(1_990_000u64));
        assert_eq!(bounded.max_input, U256::from(1_005_000u64));
    }

    #[test]
    fn min_output_rounds_down_and_max_input_rounds_up() {
        assert_eq!(min_output(U256::from(999u64), 1).unwrap(), U256::from(998u64));
        assert_eq!(max_input(U256::from(999u64), 1).unwrap(), U256::from(1_000u64));
        assert_eq!(max_input(U256::from(10_000u64), 1).unwrap(), U256::from(10_001u64));
    }

    #[test]
    fn zero_slippage_is_identity() {
        let bounded = compute_bounds(&quote(7, 13), 0).unwrap();
        assert_eq!(bounded.min_output, U256::from(13u64));
        assert_eq!(bounded.max_input, U256::from(7u64));
    }

    #[test]
    fn out_of_range_slippage_is_rejected() {
        assert!(matches!(
            compute_bounds(&quote(1, 1), 5_001),
            Err(AggrError::InvalidSlippage(5_001))
        ));
        assert!(compute_bounds(&quote(1, 1), MAX_SLIPPAGE_BPS).is_ok());
        assert!(matches!(
            min_output(U256::from(1u8), 10_001),
            Err(AggrError::InvalidSlippage(10_001))
        ));
        assert!(matches!(
            max_input(U256::from(1u8), u32::MAX),
            Err(AggrError::InvalidSlippage(u32::MAX))
        ));
    }

    #[test]
    fn min_output_never_exceeds_output_and_is_monotone() {
        for output in [0u64, 1, 2, 3, 99, 10_000, 123_456_789, u64::MAX] {
            let output = U256::from(output);
            let mut previous = output;
            for slippage in (0..=MAX_SLIPPAGE_BPS).step_by(7) {
                let bound = min_output(output, slippage).unwrap();
                assert!(bound <= output);
                assert!(bound <= previous);
                previous = bound;
            }
        }
    }

    #[test]
    fn max_input_never_below_input() {
        for input in [0u64, 1, 9_999, 1_000_000, u64::MAX] {
            let input = U256::from(input);
            for slippage in [0, 1, 50, 4_999, 5_000] {
                assert!(max_input(input, slippage).unwrap() >= input);
            }
        }
    }

    #[test]
    fn overflow_is_reported() {
        assert!(matches!(
            max_input(U256::MAX, 1),
            Err(AggrError::AmountOverflow)
        ));
        assert_eq!(
            max_input(U256::MAX, 0).unwrap_err().kind(),
            crate::errors::ErrorKind::AmountOverflow
        );
    }
}
