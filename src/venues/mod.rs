// Venue quote providers
// One provider per configured venue; each prices a trade against its own
// on-chain source and reports the result as a VenueQuote
//
// Numan Thabit 2025 Nov

pub mod concentrated;
pub mod constant_product;
pub mod registry;

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{VenueSpec, VenuesFile};
use crate::errors::AggrError;
use crate::trade::{ProtocolFamily, TradeRequest, VenueQuote, NATIVE_TOKEN};
use crate::transport::ChainReader;

pub use concentrated::ConcentratedLiquidityVenue;
pub use constant_product::ConstantProductVenue;
pub use registry::{RouterEntry, RouterRegistry};

#[async_trait]
pub trait VenueQuoteProvider: Send + Sync {
    fn venue_id(&self) -> &str;

    fn family(&self) -> ProtocolFamily;

    /// Price `request`. Must not assume anything about sibling venues.
    async fn quote(&self, request: &TradeRequest) -> Result<VenueQuote, AggrError>;
}

/// Build providers in venue-file order; that order is the selection tie-break.
pub fn build_providers(
    file: &VenuesFile,
    reader: Arc<dyn ChainReader>,
) -> Vec<Arc<dyn VenueQuoteProvider>> {
    file.venues
        .iter()
        .map(|spec| -> Arc<dyn VenueQuoteProvider> {
            match spec {
                VenueSpec::ConstantProduct {
                    id,
                    factory,
                    fee_bps,
                    gas_estimate,
                    ..
                } => Arc::new(ConstantProductVenue::new(
                    id.clone(),
                    *factory,
                    file.wrapped_native,
                    *fee_bps,
                    *gas_estimate,
                    reader.clone(),
                )),
                VenueSpec::ConcentratedLiquidity {
                    id,
                    factory,
                    quoter,
                    fee_tiers,
                    gas_overhead,
                    ..
                } => Arc::new(ConcentratedLiquidityVenue::new(
                    id.clone(),
                    *factory,
                    *quoter,
                    file.wrapped_native,
                    fee_tiers.clone(),
                    *gas_overhead,
                    reader.clone(),
                )),
            }
        })
        .collect()
}

/// Map the native-asset sentinel to the wrapped token pools actually hold.
pub(crate) fn pool_token(token: Address, wrapped_native: Address) -> Address {
    if token == NATIVE_TOKEN {
        wrapped_native
    } else {
        token
    }
}

/// ABI-encode `call`, run it through `reader` and decode the return data.
pub(crate) async fn read_contract<C>(
    reader: &dyn ChainReader,
    to: Address,
    call: &C,
) -> Result<C::Return, AggrError>
where
    C: SolCall + Sync,
{
    let raw = reader.call(to, Bytes::from(call.abi_encode())).await?;
    C::abi_decode_returns(&raw)
        .map_err(|e| AggrError::Provider(format!("decode {}: {e}", C::SIGNATURE)))
}
