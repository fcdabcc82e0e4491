// Quote validation module
// Checks a venue quote against the trade it answers and the executor limits,
// both when admitting quotes to selection and again before execution
//
// Numan Thabit 2025 Nov

use alloy_primitives::{Address, U256};

use crate::config::ExecutorConfig;
use crate::errors::AggrError;
use crate::trade::{TradeDirection, TradeRequest, VenueQuote};
use crate::venues::pool_token;

/// Reject quotes that do not answer `request`: the fixed side must match exactly
/// and the variable side must be non-zero.
pub fn check_quote_shape(quote: &VenueQuote, request: &TradeRequest) -> Result<(), AggrError> {
    match request.direction {
        TradeDirection::ExactInput => {
            if quote.input_amount != request.amount {
                return Err(AggrError::QuoteMismatch(format!(
                    "quoted input {} differs from requested {}",
                    quote.input_amount, request.amount
                )));
            }
            if quote.output_amount == U256::ZERO {
                return Err(AggrError::QuoteMismatch("zero output".into()));
            }
        }
        TradeDirection::ExactOutput => {
            if quote.output_amount != request.amount {
                return Err(AggrError::QuoteMismatch(format!(
                    "quoted output {} differs from requested {}",
                    quote.output_amount, request.amount
                )));
            }
            if quote.input_amount == U256::ZERO {
                return Err(AggrError::QuoteMismatch("zero input".into()));
            }
        }
    }
    Ok(())
}

/// The route must start at the requested input token and end at the requested output
/// token. Routes carry pool tokens, so the native sentinel stands for `wrapped_native`.
pub fn check_route_tokens(
    quote: &VenueQuote,
    request: &TradeRequest,
    wrapped_native: Address,
) -> Result<(), AggrError> {
    let (first, last) = quote
        .route_hint
        .endpoints()
        .ok_or_else(|| AggrError::QuoteMismatch("route names no tokens".into()))?;
    let token_in = pool_token(request.input_token, wrapped_native);
    let token_out = pool_token(request.output_token, wrapped_native);
    if first != token_in || last != token_out {
        return Err(AggrError::QuoteMismatch(format!(
            "route trades {first} -> {last}, request is {token_in} -> {token_out}"
        )));
    }
    Ok(())
}

pub fn check_hops(quote: &VenueQuote, config: &ExecutorConfig) -> Result<(), AggrError> {
    let hops = quote.route_hint.hops();
    if hops == 0 || hops > config.max_hops {
        return Err(AggrError::QuoteMismatch(format!(
            "route has {hops} hops, allowed 1..={}",
            config.max_hops
        )));
    }
    Ok(())
}

pub fn check_price_impact(quote: &VenueQuote, config: &ExecutorConfig) -> Result<(), AggrError> {
    if quote.price_impact_bps > config.max_price_impact_bps {
        return Err(AggrError::PriceImpactExceeded {
            impact_bps: quote.price_impact_bps,
            max_bps: config.max_price_impact_bps,
        });
    }
    Ok(())
}

/// Pre-execution validation run in the `Validating` state.
pub fn validate_for_execution(
    quote: &VenueQuote,
    request: &TradeRequest,
    config: &ExecutorConfig,
    wrapped_native: Address,
) -> Result<(), AggrError> {
    check_price_impact(quote, config)?;
    check_quote_shape(quote, request)?;
    check_route_tokens(quote, request, wrapped_native)?;
    check_hops(quote, config)
}
