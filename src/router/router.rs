// Swap engine and HTTP API
// The engine ties quote selection and execution together and guards
// against concurrent executions of the same trade
//
// Numan Thabit 2025 Nov

use alloy_primitives::{Address, U256};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router as AxumRouter,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::bounds::compute_bounds;
use crate::config::{ConfigOverrides, ExecutorConfig};
use crate::errors::{AggrError, ErrorKind};
use crate::router::execution::{
    ExecutionCoordinator, ExecutionCounters, ExecutionResult, ExecutionStats,
};
use crate::router::routes::{QuoteSelection, VenueFailure};
use crate::router::selector::QuoteAggregator;
use crate::trade::{TradeDirection, TradeRequest, VenueQuote};
use crate::transport::ChainBroadcaster;
use crate::venues::{RouterRegistry, VenueQuoteProvider};

/// Quote selection plus execution over a fixed venue set
pub struct SwapEngine {
    registry: Arc<RouterRegistry>,
    aggregator: QuoteAggregator,
    broadcaster: Arc<dyn ChainBroadcaster>,
    config: ExecutorConfig,
    inflight: Mutex<HashSet<String>>,
    counters: Arc<ExecutionCounters>,
}

/// Holds an idempotency key for the duration of one execution.
struct InflightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.key);
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    // the set stays consistent even if a holder panicked
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SwapEngine {
    pub fn new(
        registry: Arc<RouterRegistry>,
        providers: Vec<Arc<dyn VenueQuoteProvider>>,
        broadcaster: Arc<dyn ChainBroadcaster>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            aggregator: QuoteAggregator::new(providers),
            broadcaster,
            config,
            inflight: Mutex::new(HashSet::new()),
            counters: Arc::new(ExecutionCounters::default()),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RouterRegistry> {
        &self.registry
    }

    /// Process config with `overrides` applied, validated.
    pub fn effective_config(
        &self,
        overrides: &ConfigOverrides,
    ) -> Result<ExecutorConfig, AggrError> {
        let config = self.config.with_overrides(overrides);
        config
            .validate()
            .map_err(|e| AggrError::Config(e.to_string()))?;
        Ok(config)
    }

    pub async fn get_best_quote(&self, request: &TradeRequest) -> Result<VenueQuote, AggrError> {
        self.aggregator.get_best_quote(request, &self.config).await
    }

    pub async fn get_best_quote_with(
        &self,
        request: &TradeRequest,
        overrides: &ConfigOverrides,
    ) -> Result<VenueQuote, AggrError> {
        let config = self.effective_config(overrides)?;
        self.aggregator.get_best_quote(request, &config).await
    }

    /// Full selection outcome, for previews
    pub async fn select(
        &self,
        request: &TradeRequest,
        overrides: &ConfigOverrides,
    ) -> Result<QuoteSelection, AggrError> {
        let config = self.effective_config(overrides)?;
        self.aggregator.select(request, &config).await
    }

    pub async fn execute_swap(
        &self,
        quote: &VenueQuote,
        request: &TradeRequest,
    ) -> Result<ExecutionResult, AggrError> {
        self.run_coordinator(quote, request, self.config.clone()).await
    }

    pub async fn execute_swap_with(
        &self,
        quote: &VenueQuote,
        request: &TradeRequest,
        overrides: &ConfigOverrides,
    ) -> Result<ExecutionResult, AggrError> {
        let config = self.effective_config(overrides)?;
        self.run_coordinator(quote, request, config).await
    }

    /// Select the best quote and execute it under one config.
    pub async fn quote_and_execute(
        &self,
        request: &TradeRequest,
        overrides: &ConfigOverrides,
    ) -> Result<ExecutionResult, AggrError> {
        let config = self.effective_config(overrides)?;
        let best = self.aggregator.get_best_quote(request, &config).await?;
        self.run_coordinator(&best, request, config).await
    }

    pub fn stats(&self) -> ExecutionStats {
        self.counters.snapshot()
    }

    /// Number of executions currently holding their idempotency key
    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }

    async fn run_coordinator(
        &self,
        quote: &VenueQuote,
        request: &TradeRequest,
        config: ExecutorConfig,
    ) -> Result<ExecutionResult, AggrError> {
        let key = request.idempotency_key();
        let _guard = self.acquire(&key)?;
        let mut coordinator = ExecutionCoordinator::new(
            key,
            self.registry.clone(),
            self.broadcaster.clone(),
            config,
            self.counters.clone(),
        );
        coordinator.run(quote, request).await
    }

    fn acquire(&self, key: &str) -> Result<InflightGuard<'_>, AggrError> {
        if !lock(&self.inflight).insert(key.to_string()) {
            debug!(key, "execution already in flight");
            return Err(AggrError::AlreadyExecuting(key.to_string()));
        }
        Ok(InflightGuard {
            set: &self.inflight,
            key: key.to_string(),
        })
    }
}

/// Trade as submitted over HTTP; unset limits come from the executor config.
#[derive(Debug, Deserialize)]
pub struct SwapBody {
    pub input_token: Address,
    pub output_token: Address,
    pub amount: U256,
    pub recipient: Address,
    #[serde(default = "default_direction")]
    pub direction: TradeDirection,
    pub slippage_bps: Option<u32>,
    pub deadline_seconds: Option<u64>,
    pub request_id: Option<String>,
    #[serde(default)]
    pub overrides: ConfigOverrides,
}

fn default_direction() -> TradeDirection {
    TradeDirection::ExactInput
}

impl SwapBody {
    pub fn into_request(self, config: &ExecutorConfig) -> (TradeRequest, ConfigOverrides) {
        let request = TradeRequest {
            input_token: self.input_token,
            output_token: self.output_token,
            amount: self.amount,
            slippage_bps: self.slippage_bps.unwrap_or(config.default_slippage_bps),
            deadline_seconds: self
                .deadline_seconds
                .unwrap_or(config.default_deadline_seconds),
            recipient: self.recipient,
            direction: self.direction,
            request_id: self.request_id,
        };
        (request, self.overrides)
    }
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub best: VenueQuote,
    pub min_output: U256,
    pub max_input: U256,
    pub alternatives: Vec<VenueQuote>,
    pub failures: Vec<VenueFailure>,
    pub venues_queried: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidSlippage
        | ErrorKind::Config
        | ErrorKind::QuoteMismatch
        | ErrorKind::AmountOverflow => StatusCode::BAD_REQUEST,
        ErrorKind::AlreadyExecuting => StatusCode::CONFLICT,
        ErrorKind::NoLiquidity
        | ErrorKind::UnsupportedVenue
        | ErrorKind::PriceImpactExceeded
        | ErrorKind::BuildTx => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::VenueTimeout | ErrorKind::TransactionTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Transport
        | ErrorKind::Provider
        | ErrorKind::VenueError
        | ErrorKind::SubmissionFailed
        | ErrorKind::TransactionReverted => StatusCode::BAD_GATEWAY,
    }
}

fn api_error(err: AggrError) -> ApiError {
    let kind = err.kind();
    let status = status_for(kind);
    if status.is_server_error() {
        warn!(error = %err, kind = kind.as_str(), "request failed");
    }
    (
        status,
        Json(ErrorResponse {
            kind,
            error: err.to_string(),
        }),
    )
}

/// Create the HTTP router with API endpoints
pub fn create_api_router(engine: Arc<SwapEngine>) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health_check))
        .route("/api/v1/quote", post(quote_route))
        .route("/api/v1/swap", post(execute_swap))
        .route("/api/v1/stats", get(get_stats))
        .route("/metrics", get(metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(engine)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Selection preview; nothing is submitted
async fn quote_route(
    State(engine): State<Arc<SwapEngine>>,
    Json(body): Json<SwapBody>,
) -> Result<Json<QuoteResponse>, ApiError> {
    let config = engine.effective_config(&body.overrides).map_err(api_error)?;
    let (request, overrides) = body.into_request(&config);
    let selection = engine.select(&request, &overrides).await.map_err(api_error)?;
    let bounded = compute_bounds(&selection.best, request.slippage_bps).map_err(api_error)?;
    Ok(Json(QuoteResponse {
        min_output: bounded.min_output,
        max_input: bounded.max_input,
        best: selection.best,
        alternatives: selection.alternatives,
        failures: selection.failures,
        venues_queried: selection.venues_queried,
    }))
}

async fn execute_swap(
    State(engine): State<Arc<SwapEngine>>,
    Json(body): Json<SwapBody>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let config = engine.effective_config(&body.overrides).map_err(api_error)?;
    let (request, overrides) = body.into_request(&config);
    engine
        .quote_and_execute(&request, &overrides)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn get_stats(State(engine): State<Arc<SwapEngine>>) -> Json<ExecutionStats> {
    Json(engine.stats())
}

async fn metrics() -> String {
    crate::metrics::render()
}
