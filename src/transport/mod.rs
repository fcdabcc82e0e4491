// Chain collaborator interfaces
// Read access for venue pricing and broadcast/confirmation for execution.
// Signing happens behind the broadcaster and is never done in-process.
//
// Numan Thabit 2025 Nov

pub mod jsonrpc;

use alloy_primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::errors::AggrError;
use crate::router::routes::EncodedRoute;

/// Read-only contract calls against the latest block.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, AggrError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub status: TxStatus,
    pub block_number: u64,
    pub gas_used: u64,
    /// Block timestamp, unix seconds; zero when the block header could not be read
    pub timestamp: u64,
}

/// Hands encoded calls to the wallet/signer and watches them land.
#[async_trait]
pub trait ChainBroadcaster: Send + Sync {
    async fn submit(&self, route: &EncodedRoute) -> Result<TxHash, AggrError>;

    /// Must return [`AggrError::TransactionTimeout`] once `timeout` elapses without a receipt.
    /// Read failures while watching are not a verdict and must not end the watch early.
    async fn await_confirmation(
        &self,
        tx: TxHash,
        timeout: Duration,
    ) -> Result<Confirmation, AggrError>;
}
