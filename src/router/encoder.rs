// Route encoder - turns a bounded quote into router calldata
// One variant per protocol family. Encoding is pure: the same inputs
// always produce byte-identical calldata
//
// Numan Thabit 2025 Nov

use alloy_primitives::aliases::{U160, U24};
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};

use crate::bounds::BoundedQuote;
use crate::errors::AggrError;
use crate::router::routes::EncodedRoute;
use crate::trade::{ProtocolFamily, RouteHint, TradeDirection, TradeRequest, VenueQuote};
use crate::venues::{pool_token, RouterEntry, RouterRegistry};

sol! {
    interface IUniswapV2Router02 {
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function swapTokensForExactTokens(uint256 amountOut, uint256 amountInMax, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function swapExactETHForTokens(uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external payable returns (uint256[] memory amounts);
        function swapETHForExactTokens(uint256 amountOut, address[] calldata path, address to, uint256 deadline) external payable returns (uint256[] memory amounts);
        function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
        function swapTokensForExactETH(uint256 amountOut, uint256 amountInMax, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts);
    }

    interface ISwapRouter {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        struct ExactOutputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountOut;
            uint256 amountInMaximum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
        function exactOutputSingle(ExactOutputSingleParams calldata params) external payable returns (uint256 amountIn);
    }
}

/// Calldata builder for one protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteEncoder {
    /// Uniswap-V2 style router walking a token path
    ConstantProductPath,
    /// Uniswap-V3 style router, one pool per call
    ConcentratedSingleHop,
}

/// Everything `encode` needs besides the quote and the request
#[derive(Debug, Clone, Copy)]
pub struct EncodeParams {
    pub router: Address,
    pub wrapped_native: Address,
    /// Absolute unix deadline
    pub deadline: u64,
    pub gas_limit: u64,
}

impl RouteEncoder {
    pub fn for_family(family: ProtocolFamily) -> Self {
        match family {
            ProtocolFamily::ConstantProduct => Self::ConstantProductPath,
            ProtocolFamily::ConcentratedLiquidity => Self::ConcentratedSingleHop,
        }
    }

    pub fn family(&self) -> ProtocolFamily {
        match self {
            Self::ConstantProductPath => ProtocolFamily::ConstantProduct,
            Self::ConcentratedSingleHop => ProtocolFamily::ConcentratedLiquidity,
        }
    }

    /// Find the quote's router and check the quote was produced by that router's family.
    pub fn resolve<'a>(
        registry: &'a RouterRegistry,
        quote: &VenueQuote,
    ) -> Result<(Self, &'a RouterEntry), AggrError> {
        let entry = registry.router_for(&quote.venue_id)?;
        if entry.family != quote.route_hint.family() {
            return Err(AggrError::UnsupportedVenue(format!(
                "{} is {} but quote carries a {} route",
                entry.venue_id,
                entry.family,
                quote.route_hint.family()
            )));
        }
        Ok((Self::for_family(entry.family), entry))
    }

    pub fn encode(
        &self,
        bounded: &BoundedQuote,
        request: &TradeRequest,
        params: &EncodeParams,
    ) -> Result<EncodedRoute, AggrError> {
        let (calldata, native_value) = match (self, &bounded.quote.route_hint) {
            (Self::ConstantProductPath, RouteHint::ConstantProduct { path }) => {
                encode_path(bounded, request, path, params)?
            }
            (
                Self::ConcentratedSingleHop,
                RouteHint::ConcentratedLiquidity {
                    token_in,
                    token_out,
                    fee_tier,
                },
            ) => encode_single(bounded, request, *token_in, *token_out, *fee_tier, params)?,
            (encoder, hint) => {
                return Err(AggrError::UnsupportedVenue(format!(
                    "{} encoder cannot build a {} route",
                    encoder.family(),
                    hint.family()
                )))
            }
        };

        Ok(EncodedRoute {
            target: params.router,
            calldata: Bytes::from(calldata),
            native_value,
            gas_limit: params.gas_limit,
            deadline: params.deadline,
        })
    }
}

fn encode_path(
    bounded: &BoundedQuote,
    request: &TradeRequest,
    path: &[Address],
    params: &EncodeParams,
) -> Result<(Vec<u8>, U256), AggrError> {
    if path.len() < 2 {
        return Err(AggrError::BuildTx(format!("path of length {} has no hop", path.len())));
    }
    let path: Vec<Address> = path.iter().map(|t| pool_token(*t, params.wrapped_native)).collect();
    let to = request.recipient;
    let deadline = U256::from(params.deadline);
    let quote = &bounded.quote;

    if request.is_native_input() && request.is_native_output() {
        return Err(AggrError::BuildTx("native asset on both sides".into()));
    }

    let encoded = match (request.direction, request.is_native_input(), request.is_native_output()) {
        (TradeDirection::ExactInput, true, _) => (
            IUniswapV2Router02::swapExactETHForTokensCall {
                amountOutMin: bounded.min_output,
                path,
                to,
                deadline,
            }
            .abi_encode(),
            quote.input_amount,
        ),
        (TradeDirection::ExactOutput, true, _) => (
            IUniswapV2Router02::swapETHForExactTokensCall {
                amountOut: quote.output_amount,
                path,
                to,
                deadline,
            }
            .abi_encode(),
            bounded.max_input,
        ),
        (TradeDirection::ExactInput, false, true) => (
            IUniswapV2Router02::swapExactTokensForETHCall {
                amountIn: quote.input_amount,
                amountOutMin: bounded.min_output,
                path,
                to,
                deadline,
            }
            .abi_encode(),
            U256::ZERO,
        ),
        (TradeDirection::ExactOutput, false, true) => (
            IUniswapV2Router02::swapTokensForExactETHCall {
                amountOut: quote.output_amount,
                amountInMax: bounded.max_input,
                path,
                to,
                deadline,
            }
            .abi_encode(),
            U256::ZERO,
        ),
        (TradeDirection::ExactInput, false, false) => (
            IUniswapV2Router02::swapExactTokensForTokensCall {
                amountIn: quote.input_amount,
                amountOutMin: bounded.min_output,
                path,
                to,
                deadline,
            }
            .abi_encode(),
            U256::ZERO,
        ),
        (TradeDirection::ExactOutput, false, false) => (
            IUniswapV2Router02::swapTokensForExactTokensCall {
                amountOut: quote.output_amount,
                amountInMax: bounded.max_input,
                path,
                to,
                deadline,
            }
            .abi_encode(),
            U256::ZERO,
        ),
    };
    Ok(encoded)
}

fn encode_single(
    bounded: &BoundedQuote,
    request: &TradeRequest,
    token_in: Address,
    token_out: Address,
    fee_tier: u32,
    params: &EncodeParams,
) -> Result<(Vec<u8>, U256), AggrError> {
    if request.is_native_output() {
        // the single call would leave wrapped tokens with the recipient
        return Err(AggrError::BuildTx(
            "native output needs an unwrap step on this router".into(),
        ));
    }
    if fee_tier >= 1 << 24 {
        return Err(AggrError::BuildTx(format!("fee tier {fee_tier} does not fit uint24")));
    }
    let fee = U24::from(fee_tier);
    let token_in = pool_token(token_in, params.wrapped_native);
    let token_out = pool_token(token_out, params.wrapped_native);
    let deadline = U256::from(params.deadline);
    let quote = &bounded.quote;

    let (calldata, paid) = match request.direction {
        TradeDirection::ExactInput => (
            ISwapRouter::exactInputSingleCall {
                params: ISwapRouter::ExactInputSingleParams {
                    tokenIn: token_in,
                    tokenOut: token_out,
                    fee,
                    recipient: request.recipient,
                    deadline,
                    amountIn: quote.input_amount,
                    amountOutMinimum: bounded.min_output,
                    sqrtPriceLimitX96: U160::ZERO,
                },
            }
            .abi_encode(),
            quote.input_amount,
        ),
        TradeDirection::ExactOutput => (
            ISwapRouter::exactOutputSingleCall {
                params: ISwapRouter::ExactOutputSingleParams {
                    tokenIn: token_in,
                    tokenOut: token_out,
                    fee,
                    recipient: request.recipient,
                    deadline,
                    amountOut: quote.output_amount,
                    amountInMaximum: bounded.max_input,
                    sqrtPriceLimitX96: U160::ZERO,
                },
            }
            .abi_encode(),
            bounded.max_input,
        ),
    };
    let native_value = if request.is_native_input() {
        paid
    } else {
        U256::ZERO
    };
    Ok((calldata, native_value))
}
