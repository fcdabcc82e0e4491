// Router module - selection and execution plane
// Fans trades out to venues, picks the best quote, encodes the router call
// and drives it to confirmation
//
// Numan Thabit 2025 Nov

pub mod encoder;
pub mod execution;
pub mod routes;
pub mod selector;
pub mod validation;

#[allow(clippy::module_inception)]
pub mod router;

pub use encoder::RouteEncoder;
pub use execution::{ExecutionCoordinator, ExecutionResult, ExecutionState, ExecutionStats};
pub use router::{create_api_router, SwapEngine};
pub use routes::{EncodedRoute, QuoteSelection, VenueFailure};
pub use selector::QuoteAggregator;
