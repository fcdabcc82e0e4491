// Constant-product venue
// Prices a direct pair from its on-chain reserves with the x*y=k formula.
// All amounts stay in 256-bit integers.
//
// Numan Thabit 2025 Nov

use alloy_primitives::{Address, U256};
use alloy_sol_types::sol;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{pool_token, read_contract, VenueQuoteProvider};
use crate::errors::AggrError;
use crate::trade::{ProtocolFamily, RouteHint, TradeDirection, TradeRequest, VenueQuote};
use crate::transport::ChainReader;

sol! {
    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    // Reserves are uint112 on-chain; decoded widened since return types do not affect selectors.
    interface IUniswapV2Pair {
        function token0() external view returns (address);
        function getReserves() external view returns (
            uint256 reserve0,
            uint256 reserve1,
            uint256 blockTimestampLast
        );
    }
}

const BPS: u64 = 10_000;

pub struct ConstantProductVenue {
    id: String,
    factory: Address,
    wrapped_native: Address,
    fee_bps: u32,
    gas_estimate: u64,
    reader: Arc<dyn ChainReader>,
}

impl ConstantProductVenue {
    pub fn new(
        id: String,
        factory: Address,
        wrapped_native: Address,
        fee_bps: u32,
        gas_estimate: u64,
        reader: Arc<dyn ChainReader>,
    ) -> Self {
        Self {
            id,
            factory,
            wrapped_native,
            fee_bps,
            gas_estimate,
            reader,
        }
    }

    /// Reserves oriented as (reserve_in, reserve_out).
    async fn reserves(
        &self,
        token_in: Address,
        token_out: Address,
    ) -> Result<(U256, U256), AggrError> {
        let reader = self.reader.as_ref();
        let pair = read_contract(
            reader,
            self.factory,
            &IUniswapV2Factory::getPairCall {
                tokenA: token_in,
                tokenB: token_out,
            },
        )
        .await?;
        if pair == Address::ZERO {
            return Err(AggrError::venue(&self.id, "no pair for token pair"));
        }

        let token0_call = IUniswapV2Pair::token0Call {};
        let reserves_call = IUniswapV2Pair::getReservesCall {};
        let (token0, reserves) = futures::try_join!(
            read_contract(reader, pair, &token0_call),
            read_contract(reader, pair, &reserves_call),
        )?;
        let (reserve_in, reserve_out) = if token0 == token_in {
            (reserves.reserve0, reserves.reserve1)
        } else {
            (reserves.reserve1, reserves.reserve0)
        };
        debug!(venue = %self.id, pair = %pair, %reserve_in, %reserve_out, "pair reserves");
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(AggrError::venue(&self.id, "pair has no liquidity"));
        }
        Ok((reserve_in, reserve_out))
    }
}

#[async_trait]
impl VenueQuoteProvider for ConstantProductVenue {
    fn venue_id(&self) -> &str {
        &self.id
    }

    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::ConstantProduct
    }

    async fn quote(&self, request: &TradeRequest) -> Result<VenueQuote, AggrError> {
        let token_in = pool_token(request.input_token, self.wrapped_native);
        let token_out = pool_token(request.output_token, self.wrapped_native);
        if token_in == token_out {
            return Err(AggrError::venue(&self.id, "input and output token are the same"));
        }
        let (reserve_in, reserve_out) = self.reserves(token_in, token_out).await?;

        let (input_amount, output_amount) = match request.direction {
            TradeDirection::ExactInput => {
                let out = amount_out(request.amount, reserve_in, reserve_out, self.fee_bps)
                    .ok_or_else(|| AggrError::venue(&self.id, "cannot price input amount"))?;
                (request.amount, out)
            }
            TradeDirection::ExactOutput => {
                let needed = amount_in(request.amount, reserve_in, reserve_out, self.fee_bps)
                    .ok_or_else(|| AggrError::venue(&self.id, "insufficient reserves for output"))?;
                (needed, request.amount)
            }
        };

        Ok(VenueQuote {
            venue_id: self.id.clone(),
            input_amount,
            output_amount,
            estimated_gas: self.gas_estimate,
            price_impact_bps: price_impact_bps(input_amount, reserve_in),
            route_hint: RouteHint::ConstantProduct {
                path: vec![token_in, token_out],
            },
        })
    }
}

/// out = in*(1-fee)*R_out / (R_in + in*(1-fee)), rounded down; `None` for a fee above 100%.
pub fn amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
) -> Option<U256> {
    let fee_factor = BPS.checked_sub(u64::from(fee_bps))?;
    let in_with_fee = amount_in.checked_mul(U256::from(fee_factor))?;
    let numerator = in_with_fee.checked_mul(reserve_out)?;
    let denominator = reserve_in
        .checked_mul(U256::from(BPS))?
        .checked_add(in_with_fee)?;
    if denominator.is_zero() {
        return None;
    }
    Some(numerator / denominator)
}

/// in = R_in*out / ((R_out - out)*(1-fee)) + 1; `None` when the pair cannot pay `amount_out`.
pub fn amount_in(
    amount_out: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
) -> Option<U256> {
    if amount_out >= reserve_out {
        return None;
    }
    let fee_factor = BPS.checked_sub(u64::from(fee_bps))?;
    let numerator = reserve_in
        .checked_mul(amount_out)?
        .checked_mul(U256::from(BPS))?;
    let denominator = (reserve_out - amount_out).checked_mul(U256::from(fee_factor))?;
    if denominator.is_zero() {
        return None;
    }
    Some(numerator / denominator + U256::from(1u8))
}

/// Fee-free price movement caused by adding `amount_in` to the input reserve.
pub fn price_impact_bps(amount_in: U256, reserve_in: U256) -> u32 {
    let Some(scaled) = amount_in.checked_mul(U256::from(BPS)) else {
        return BPS as u32;
    };
    let Some(denominator) = reserve_in.checked_add(amount_in) else {
        return BPS as u32;
    };
    if denominator.is_zero() {
        return 0;
    }
    (scaled / denominator).saturating_to::<u32>()
}
