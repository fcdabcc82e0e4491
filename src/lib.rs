// Library root module for swap-aggr
// This file defines the public API and module structure for the swap-aggr library
// It exports the main functionality that can be used by other crates
//
// Numan Thabit 2025 Nov

pub mod bounds;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod router;
pub mod trade;
pub mod transport;
pub mod venues;
