// Concentrated-liquidity venue
// Prices every configured fee tier through the on-chain quoter contract and
// keeps the best one. Price impact is read off the pool's sqrt price before
// and after the simulated swap.
//
// Numan Thabit 2025 Nov

use alloy_primitives::aliases::{U160, U24};
use alloy_primitives::{Address, U256};
use alloy_sol_types::sol;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

use super::{pool_token, read_contract, VenueQuoteProvider};
use crate::errors::AggrError;
use crate::router::selector::compare_quotes;
use crate::trade::{ProtocolFamily, RouteHint, TradeDirection, TradeRequest, VenueQuote};
use crate::transport::ChainReader;

sol! {
    interface IUniswapV3Factory {
        function getPool(address tokenA, address tokenB, uint24 fee) external view returns (address pool);
    }

    // Narrow on-chain types decoded widened; only the sqrt price is used.
    interface IUniswapV3Pool {
        function slot0() external view returns (
            uint256 sqrtPriceX96,
            int256 tick,
            uint256 observationIndex,
            uint256 observationCardinality,
            uint256 observationCardinalityNext,
            uint256 feeProtocol,
            bool unlocked
        );
    }

    interface IQuoterV2 {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        struct QuoteExactOutputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amount;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }

        function quoteExactInputSingle(QuoteExactInputSingleParams memory params) external returns (
            uint256 amountOut,
            uint256 sqrtPriceX96After,
            uint32 initializedTicksCrossed,
            uint256 gasEstimate
        );

        function quoteExactOutputSingle(QuoteExactOutputSingleParams memory params) external returns (
            uint256 amountIn,
            uint256 sqrtPriceX96After,
            uint32 initializedTicksCrossed,
            uint256 gasEstimate
        );
    }
}

const MAX_FEE_TIER: u32 = 1 << 24;
const BPS: u64 = 10_000;

pub struct ConcentratedLiquidityVenue {
    id: String,
    factory: Address,
    quoter: Address,
    wrapped_native: Address,
    fee_tiers: Vec<u32>,
    gas_overhead: u64,
    reader: Arc<dyn ChainReader>,
}

/// Quoter answer for one tier, oriented to the request
struct TierQuote {
    input_amount: U256,
    output_amount: U256,
    sqrt_price_after: U256,
    gas_estimate: U256,
}

impl ConcentratedLiquidityVenue {
    pub fn new(
        id: String,
        factory: Address,
        quoter: Address,
        wrapped_native: Address,
        fee_tiers: Vec<u32>,
        gas_overhead: u64,
        reader: Arc<dyn ChainReader>,
    ) -> Self {
        Self {
            id,
            factory,
            quoter,
            wrapped_native,
            fee_tiers,
            gas_overhead,
            reader,
        }
    }

    async fn quote_tier(
        &self,
        request: &TradeRequest,
        token_in: Address,
        token_out: Address,
        fee_tier: u32,
    ) -> Result<VenueQuote, AggrError> {
        if fee_tier >= MAX_FEE_TIER {
            return Err(AggrError::venue(&self.id, format!("fee tier {fee_tier} out of range")));
        }
        let fee = U24::from(fee_tier);
        let reader = self.reader.as_ref();

        let pool = read_contract(
            reader,
            self.factory,
            &IUniswapV3Factory::getPoolCall {
                tokenA: token_in,
                tokenB: token_out,
                fee,
            },
        )
        .await?;
        if pool == Address::ZERO {
            return Err(AggrError::venue(&self.id, format!("no pool for fee tier {fee_tier}")));
        }

        let slot0_call = IUniswapV3Pool::slot0Call {};
        let (slot0, tier) = futures::try_join!(
            read_contract(reader, pool, &slot0_call),
            self.run_quoter(request, token_in, token_out, fee),
        )?;

        if tier.input_amount.is_zero() || tier.output_amount.is_zero() {
            return Err(AggrError::venue(&self.id, format!("empty quote for fee tier {fee_tier}")));
        }
        let price_impact_bps = sqrt_price_impact_bps(slot0.sqrtPriceX96, tier.sqrt_price_after);
        debug!(
            venue = %self.id,
            %pool,
            fee_tier,
            input = %tier.input_amount,
            output = %tier.output_amount,
            price_impact_bps,
            "tier quoted"
        );

        Ok(VenueQuote {
            venue_id: self.id.clone(),
            input_amount: tier.input_amount,
            output_amount: tier.output_amount,
            estimated_gas: tier
                .gas_estimate
                .saturating_to::<u64>()
                .saturating_add(self.gas_overhead),
            price_impact_bps,
            route_hint: RouteHint::ConcentratedLiquidity {
                token_in,
                token_out,
                fee_tier,
            },
        })
    }

    async fn run_quoter(
        &self,
        request: &TradeRequest,
        token_in: Address,
        token_out: Address,
        fee: U24,
    ) -> Result<TierQuote, AggrError> {
        let reader = self.reader.as_ref();
        match request.direction {
            TradeDirection::ExactInput => {
                let ret = read_contract(
                    reader,
                    self.quoter,
                    &IQuoterV2::quoteExactInputSingleCall {
                        params: IQuoterV2::QuoteExactInputSingleParams {
                            tokenIn: token_in,
                            tokenOut: token_out,
                            amountIn: request.amount,
                            fee,
                            sqrtPriceLimitX96: U160::ZERO,
                        },
                    },
                )
                .await?;
                Ok(TierQuote {
                    input_amount: request.amount,
                    output_amount: ret.amountOut,
                    sqrt_price_after: ret.sqrtPriceX96After,
                    gas_estimate: ret.gasEstimate,
                })
            }
            TradeDirection::ExactOutput => {
                let ret = read_contract(
                    reader,
                    self.quoter,
                    &IQuoterV2::quoteExactOutputSingleCall {
                        params: IQuoterV2::QuoteExactOutputSingleParams {
                            tokenIn: token_in,
                            tokenOut: token_out,
                            amount: request.amount,
                            fee,
                            sqrtPriceLimitX96: U160::ZERO,
                        },
                    },
                )
                .await?;
                Ok(TierQuote {
                    input_amount: ret.amountIn,
                    output_amount: request.amount,
                    sqrt_price_after: ret.sqrtPriceX96After,
                    gas_estimate: ret.gasEstimate,
                })
            }
        }
    }
}

#[async_trait]
impl VenueQuoteProvider for ConcentratedLiquidityVenue {
    fn venue_id(&self) -> &str {
        &self.id
    }

    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::ConcentratedLiquidity
    }

    async fn quote(&self, request: &TradeRequest) -> Result<VenueQuote, AggrError> {
        let token_in = pool_token(request.input_token, self.wrapped_native);
        let token_out = pool_token(request.output_token, self.wrapped_native);
        if token_in == token_out {
            return Err(AggrError::venue(&self.id, "input and output token are the same"));
        }

        let settled = join_all(
            self.fee_tiers
                .iter()
                .map(|&tier| self.quote_tier(request, token_in, token_out, tier)),
        )
        .await;

        let mut last_err = None;
        let mut quotes = Vec::with_capacity(settled.len());
        for (tier, result) in self.fee_tiers.iter().zip(settled) {
            match result {
                Ok(quote) => quotes.push(quote),
                Err(err) => {
                    debug!(venue = %self.id, fee_tier = tier, error = %err, "tier skipped");
                    last_err = Some(err);
                }
            }
        }

        // min_by keeps the first of equals, so tier order breaks ties
        quotes
            .into_iter()
            .min_by(|a, b| compare_quotes(request.direction, a, b))
            .ok_or_else(|| match last_err {
                Some(err) => AggrError::venue(&self.id, err),
                None => AggrError::venue(&self.id, "no fee tiers configured"),
            })
    }
}

/// |1 - P_after/P_before| in bps, with P = sqrtP^2. Saturates at 100%.
pub fn sqrt_price_impact_bps(sqrt_before: U256, sqrt_after: U256) -> u32 {
    const SCALE_9: u64 = 1_000_000_000;
    let max = BPS as u32;
    if sqrt_before.is_zero() {
        return max;
    }
    let Some(scaled) = sqrt_after.checked_mul(U256::from(SCALE_9)) else {
        return max;
    };
    let ratio_9 = scaled / sqrt_before;
    let Some(ratio_18) = ratio_9.checked_mul(ratio_9) else {
        return max;
    };
    let one_18 = U256::from(SCALE_9) * U256::from(SCALE_9);
    let deviation = if ratio_18 > one_18 {
        ratio_18 - one_18
    } else {
        one_18 - ratio_18
    };
    match deviation.checked_mul(U256::from(BPS)) {
        Some(v) => (v / one_18).saturating_to::<u32>().min(max),
        None => max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::testing::MockChain;
    use alloy_sol_types::SolValue;

    const FACTORY: Address = Address::new([0xfa; 20]);
    const QUOTER: Address = Address::new([0xcc; 20]);
    const POOL_LOW: Address = Address::new([0xb1; 20]);
    const POOL_MID: Address = Address::new([0xb2; 20]);
    const WETH: Address = Address::new([0xc0; 20]);
    const TOKEN_A: Address = Address::new([0x0a; 20]);
    const TOKEN_B: Address = Address::new([0x0b; 20]);

    fn request(direction: TradeDirection, amount: u64) -> TradeRequest {
        TradeRequest {
            input_token: TOKEN_A,
            output_token: TOKEN_B,
            amount: U256::from(amount),
            slippage_bps: 50,
            deadline_seconds: 600,
            recipient: Address::repeat_byte(0x33),
            direction,
            request_id: None,
        }
    }

    fn slot0(sqrt_price: u64) -> Vec<u8> {
        (
            U256::from(sqrt_price),
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
            true,
        )
            .abi_encode()
    }

    fn pool(chain: &MockChain, fee: u32, pool: Address, sqrt_price: u64) {
        chain.respond(
            FACTORY,
            IUniswapV3Factory::getPoolCall {
                tokenA: TOKEN_A,
                tokenB: TOKEN_B,
                fee: U24::from(fee),
            },
            pool.abi_encode(),
        );
        chain.respond(pool, IUniswapV3Pool::slot0Call {}, slot0(sqrt_price));
    }

    fn exact_in(chain: &MockChain, fee: u32, amount: u64, out: u64, sqrt_after: u64, gas: u64) {
        chain.respond(
            QUOTER,
            IQuoterV2::quoteExactInputSingleCall {
                params: IQuoterV2::QuoteExactInputSingleParams {
                    tokenIn: TOKEN_A,
                    tokenOut: TOKEN_B,
                    amountIn: U256::from(amount),
                    fee: U24::from(fee),
                    sqrtPriceLimitX96: U160::ZERO,
                },
            },
            (U256::from(out), U256::from(sqrt_after), 1u32, U256::from(gas)).abi_encode(),
        );
    }

    fn venue(chain: MockChain, tiers: Vec<u32>) -> ConcentratedLiquidityVenue {
        ConcentratedLiquidityVenue::new(
            "v3".into(),
            FACTORY,
            QUOTER,
            WETH,
            tiers,
            60_000,
            Arc::new(chain),
        )
    }

    #[test]
    fn impact_from_sqrt_prices() {
        let before = U256::from(1_000_000u64);
        assert_eq!(sqrt_price_impact_bps(before, before), 0);
        assert_eq!(sqrt_price_impact_bps(before, U256::from(990_000u64)), 199);
        assert_eq!(sqrt_price_impact_bps(before, U256::from(1_010_000u64)), 201);
        assert_eq!(sqrt_price_impact_bps(before, U256::ZERO), 10_000);
        assert_eq!(sqrt_price_impact_bps(U256::ZERO, before), 10_000);
        assert_eq!(sqrt_price_impact_bps(U256::from(1u8), U256::MAX), 10_000);
    }

    #[tokio::test]
    async fn best_tier_wins() {
        let chain = MockChain::default();
        pool(&chain, 500, POOL_LOW, 1_000_000);
        pool(&chain, 3000, POOL_MID, 1_000_000);
        exact_in(&chain, 500, 1_000, 1_950, 990_000, 90_000);
        exact_in(&chain, 3000, 1_000, 1_990, 1_000_000, 80_000);

        let quote = venue(chain, vec![500, 3000])
            .quote(&request(TradeDirection::ExactInput, 1_000))
            .await
            .unwrap();
        assert_eq!(quote.output_amount, U256::from(1_990u64));
        assert_eq!(quote.input_amount, U256::from(1_000u64));
        assert_eq!(quote.estimated_gas, 140_000);
        assert_eq!(quote.price_impact_bps, 0);
        assert_eq!(
            quote.route_hint,
            RouteHint::ConcentratedLiquidity {
                token_in: TOKEN_A,
                token_out: TOKEN_B,
                fee_tier: 3000,
            }
        );
    }

    #[tokio::test]
    async fn missing_pool_tier_is_skipped() {
        let chain = MockChain::default();
        chain.respond(
            FACTORY,
            IUniswapV3Factory::getPoolCall {
                tokenA: TOKEN_A,
                tokenB: TOKEN_B,
                fee: U24::from(500u32),
            },
            Address::ZERO.abi_encode(),
        );
        pool(&chain, 3000, POOL_MID, 1_000_000);
        exact_in(&chain, 3000, 1_000, 1_900, 990_000, 80_000);

        let quote = venue(chain, vec![500, 3000])
            .quote(&request(TradeDirection::ExactInput, 1_000))
            .await
            .unwrap();
        assert_eq!(quote.output_amount, U256::from(1_900u64));
        assert_eq!(quote.price_impact_bps, 199);
    }

    #[tokio::test]
    async fn exact_output_uses_output_quoter() {
        let chain = MockChain::default();
        pool(&chain, 3000, POOL_MID, 1_000_000);
        chain.respond(
            QUOTER,
            IQuoterV2::quoteExactOutputSingleCall {
                params: IQuoterV2::QuoteExactOutputSingleParams {
                    tokenIn: TOKEN_A,
                    tokenOut: TOKEN_B,
                    amount: U256::from(2_000u64),
                    fee: U24::from(3000u32),
                    sqrtPriceLimitX96: U160::ZERO,
                },
            },
            (
                U256::from(1_010u64),
                U256::from(1_000_000u64),
                0u32,
                U256::from(70_000u64),
            )
                .abi_encode(),
        );

        let quote = venue(chain, vec![3000])
            .quote(&request(TradeDirection::ExactOutput, 2_000))
            .await
            .unwrap();
        assert_eq!(quote.input_amount, U256::from(1_010u64));
        assert_eq!(quote.output_amount, U256::from(2_000u64));
    }

    #[tokio::test]
    async fn all_tiers_failing_is_a_venue_error() {
        let err = venue(MockChain::default(), vec![500, 3000])
            .quote(&request(TradeDirection::ExactInput, 1_000))
            .await
            .unwrap_err();
        assert!(matches!(err, AggrError::Venue { venue, .. } if venue == "v3"));
    }
}
