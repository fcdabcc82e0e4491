// Execution coordinator - drives one selected quote to a confirmed transaction
// Quoted -> Validating -> Submitted -> Confirmed | Failed, every transition
// checked and recorded. Submissions are never retried
//
// Numan Thabit 2025 Nov

use alloy_primitives::{TxHash, U256};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use crate::bounds::compute_bounds;
use crate::config::ExecutorConfig;
use crate::errors::AggrError;
use crate::metrics::EXECUTIONS;
use crate::router::encoder::{EncodeParams, RouteEncoder};
use crate::router::routes::EncodedRoute;
use crate::router::validation::validate_for_execution;
use crate::trade::{TradeRequest, VenueQuote};
use crate::transport::{ChainBroadcaster, TxStatus};
use crate::venues::RouterRegistry;

const PRICE_SCALE: u64 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Quoted,
    Validating,
    Submitted,
    Confirmed,
    Failed,
}

impl ExecutionState {
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Quoted, Validating)
                | (Validating, Submitted)
                | (Validating, Failed)
                | (Submitted, Confirmed)
                | (Submitted, Failed)
        )
    }
}

/// Outcome of a confirmed swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub transaction_hash: TxHash,
    pub venue_id: String,
    pub input_amount: U256,
    pub output_amount: U256,
    pub gas_used: u64,
    /// output per input, scaled by 1e18
    pub effective_price_x18: U256,
    pub block_number: u64,
    pub timestamp: u64,
}

/// Execution statistics for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub success_rate: f64,
}

/// Lock-free counters shared by every coordinator of an engine
#[derive(Debug, Default)]
pub struct ExecutionCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
}

impl ExecutionCounters {
    fn record(&self, outcome: &Result<ExecutionResult, AggrError>) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let label = match outcome {
            Ok(_) => {
                self.successful.fetch_add(1, Ordering::Relaxed);
                "confirmed"
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                err.kind().as_str()
            }
        };
        EXECUTIONS.with_label_values(&[label]).inc();
    }

    pub fn snapshot(&self) -> ExecutionStats {
        let total = self.total.load(Ordering::Relaxed);
        let successful = self.successful.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        ExecutionStats {
            total_executions: total,
            successful_executions: successful,
            failed_executions: failed,
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Single-use state machine for one trade
pub struct ExecutionCoordinator {
    trade_key: String,
    state: ExecutionState,
    history: Vec<ExecutionState>,
    registry: Arc<RouterRegistry>,
    broadcaster: Arc<dyn ChainBroadcaster>,
    config: ExecutorConfig,
    counters: Arc<ExecutionCounters>,
}

impl ExecutionCoordinator {
    pub fn new(
        trade_key: String,
        registry: Arc<RouterRegistry>,
        broadcaster: Arc<dyn ChainBroadcaster>,
        config: ExecutorConfig,
        counters: Arc<ExecutionCounters>,
    ) -> Self {
        Self {
            trade_key,
            state: ExecutionState::Quoted,
            history: vec![ExecutionState::Quoted],
            registry,
            broadcaster,
            config,
            counters,
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Every state visited so far, starting with `Quoted`
    pub fn history(&self) -> &[ExecutionState] {
        &self.history
    }

    #[tracing::instrument(skip_all, fields(key = %self.trade_key, venue = %quote.venue_id))]
    pub async fn run(
        &mut self,
        quote: &VenueQuote,
        request: &TradeRequest,
    ) -> Result<ExecutionResult, AggrError> {
        // reuse is rejected before anything is counted
        if self.state != ExecutionState::Quoted {
            return Err(AggrError::AlreadyExecuting(self.trade_key.clone()));
        }
        let outcome = self.drive(quote, request).await;
        self.counters.record(&outcome);
        match &outcome {
            Ok(result) => info!(
                tx = %result.transaction_hash,
                block = result.block_number,
                gas_used = result.gas_used,
                output = %result.output_amount,
                "swap confirmed"
            ),
            Err(err) => warn!(error = %err, kind = err.kind().as_str(), "swap failed"),
        }
        outcome
    }

    async fn drive(
        &mut self,
        quote: &VenueQuote,
        request: &TradeRequest,
    ) -> Result<ExecutionResult, AggrError> {
        self.transition(ExecutionState::Validating);

        let route = match self.prepare(quote, request) {
            Ok(route) => route,
            Err(err) => return Err(self.fail(err)),
        };

        let submitted = self.broadcaster.submit(&route).await;
        let tx = match submitted {
            Ok(tx) => tx,
            Err(AggrError::SubmissionFailed(reason)) => {
                return Err(self.fail(AggrError::SubmissionFailed(reason)))
            }
            Err(err) => return Err(self.fail(AggrError::SubmissionFailed(err.to_string()))),
        };
        self.transition(ExecutionState::Submitted);
        info!(%tx, target = %route.target, deadline = route.deadline, "swap submitted");

        let timeout = self.config.confirmation_timeout();
        let waited =
            tokio::time::timeout(timeout, self.broadcaster.await_confirmation(tx, timeout)).await;
        let timeout_ms = self.config.confirmation_timeout_ms;
        let confirmation = match waited {
            Ok(Ok(confirmation)) => confirmation,
            Ok(Err(err)) if err.is_terminal_execution_failure() => return Err(self.fail(err)),
            // the transaction is out; without a verdict the watch ends as a timeout
            Ok(Err(err)) => {
                warn!(%tx, error = %err, "confirmation watch failed without a verdict");
                return Err(self.fail(AggrError::TransactionTimeout { tx, timeout_ms }));
            }
            Err(_) => return Err(self.fail(AggrError::TransactionTimeout { tx, timeout_ms })),
        };

        if confirmation.status == TxStatus::Reverted {
            return Err(self.fail(AggrError::TransactionReverted { tx }));
        }

        self.transition(ExecutionState::Confirmed);
        Ok(ExecutionResult {
            transaction_hash: tx,
            venue_id: quote.venue_id.clone(),
            input_amount: quote.input_amount,
            output_amount: quote.output_amount,
            gas_used: confirmation.gas_used,
            effective_price_x18: effective_price_x18(quote.input_amount, quote.output_amount),
            block_number: confirmation.block_number,
            timestamp: confirmation.timestamp,
        })
    }

    /// Work done in `Validating`: checks, bounds, router lookup, deadline and calldata.
    fn prepare(
        &self,
        quote: &VenueQuote,
        request: &TradeRequest,
    ) -> Result<EncodedRoute, AggrError> {
        let wrapped_native = self.registry.wrapped_native();
        validate_for_execution(quote, request, &self.config, wrapped_native)?;
        let bounded = compute_bounds(quote, request.slippage_bps)?;
        let (encoder, entry) = RouteEncoder::resolve(&self.registry, quote)?;
        let deadline = unix_now()?.saturating_add(request.deadline_seconds);
        debug!(
            min_output = %bounded.min_output,
            max_input = %bounded.max_input,
            router = %entry.router,
            deadline,
            "bounds computed"
        );
        encoder.encode(
            &bounded,
            request,
            &EncodeParams {
                router: entry.router,
                wrapped_native,
                deadline,
                gas_limit: self.config.gas_limit,
            },
        )
    }

    fn transition(&mut self, next: ExecutionState) {
        let legal = self.state.can_transition_to(next);
        debug_assert!(legal, "illegal transition {:?} -> {:?}", self.state, next);
        if !legal {
            error!(from = ?self.state, to = ?next, "illegal execution transition");
            return;
        }
        debug!(from = ?self.state, to = ?next, "execution transition");
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, err: AggrError) -> AggrError {
        self.transition(ExecutionState::Failed);
        err
    }
}

/// output * 1e18 / input, zero when the input is zero or the product overflows
pub fn effective_price_x18(input: U256, output: U256) -> U256 {
    if input.is_zero() {
        return U256::ZERO;
    }
    output
        .checked_mul(U256::from(PRICE_SCALE))
        .map(|scaled| scaled / input)
        .unwrap_or(U256::ZERO)
}

fn unix_now() -> Result<u64, AggrError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AggrError::BuildTx(format!("system clock before unix epoch: {e}")))
}
