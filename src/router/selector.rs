// Quote selector - fans a trade out to every venue and picks the best answer
// Each venue call is bounded by the per-venue timeout; failures and timeouts
// are recorded and excluded, and selection over the rest is deterministic
//
// Numan Thabit 2025 Nov

use std::cmp::Ordering;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};

use crate::bounds::{compute_bounds, validate_slippage};
use crate::config::ExecutorConfig;
use crate::errors::AggrError;
use crate::metrics::{VENUE_QUOTE_FAILURES, VENUE_QUOTE_LATENCY};
use crate::router::routes::{QuoteSelection, VenueFailure};
use crate::router::validation::{check_hops, check_quote_shape};
use crate::trade::{TradeDirection, TradeRequest, VenueQuote};
use crate::venues::VenueQuoteProvider;

/// Ranks two quotes for the same request; `Less` means `a` is the better one.
/// ExactInput prefers more output, ExactOutput less input, then lower gas.
pub fn compare_quotes(direction: TradeDirection, a: &VenueQuote, b: &VenueQuote) -> Ordering {
    let by_amount = match direction {
        TradeDirection::ExactInput => b.output_amount.cmp(&a.output_amount),
        TradeDirection::ExactOutput => a.input_amount.cmp(&b.input_amount),
    };
    by_amount.then_with(|| a.estimated_gas.cmp(&b.estimated_gas))
}

/// A venue call after it succeeded, failed or timed out
struct Settled {
    index: usize,
    venue_id: String,
    result: Result<VenueQuote, AggrError>,
}

/// Concurrent quote collection over a fixed, ordered set of venues
pub struct QuoteAggregator {
    providers: Vec<Arc<dyn VenueQuoteProvider>>,
}

impl QuoteAggregator {
    /// Provider order is registration order and breaks exact ties.
    pub fn new(providers: Vec<Arc<dyn VenueQuoteProvider>>) -> Self {
        Self { providers }
    }

    pub async fn get_best_quote(
        &self,
        request: &TradeRequest,
        config: &ExecutorConfig,
    ) -> Result<VenueQuote, AggrError> {
        self.select(request, config).await.map(|s| s.best)
    }

    /// Query every venue and rank the admissible quotes.
    #[tracing::instrument(skip_all, fields(
        input = %request.input_token,
        output = %request.output_token,
        amount = %request.amount,
        direction = ?request.direction,
    ))]
    pub async fn select(
        &self,
        request: &TradeRequest,
        config: &ExecutorConfig,
    ) -> Result<QuoteSelection, AggrError> {
        validate_slippage(request.slippage_bps)?;

        let per_venue = config.per_venue_timeout();
        let settled = join_all(
            self.providers
                .iter()
                .enumerate()
                .map(|(index, provider)| query(index, provider.as_ref(), request, per_venue)),
        )
        .await;

        let mut ranked: Vec<(usize, VenueQuote)> = Vec::with_capacity(settled.len());
        let mut failures = Vec::new();
        for Settled {
            index,
            venue_id,
            result,
        } in settled
        {
            match result.and_then(|quote| admit(&venue_id, quote, request, config)) {
                Ok(quote) => ranked.push((index, quote)),
                Err(err) => {
                    let kind = err.kind();
                    VENUE_QUOTE_FAILURES
                        .with_label_values(&[venue_id.as_str(), kind.as_str()])
                        .inc();
                    debug!(venue = %venue_id, error = %err, "venue excluded");
                    failures.push(VenueFailure {
                        venue_id,
                        kind,
                        reason: err.to_string(),
                    });
                }
            }
        }

        ranked.sort_by(|(ia, a), (ib, b)| {
            compare_quotes(request.direction, a, b).then_with(|| ia.cmp(ib))
        });
        let mut quotes = ranked.into_iter().map(|(_, quote)| quote);
        let Some(best) = quotes.next() else {
            warn!(
                venues = self.providers.len(),
                failures = failures.len(),
                "no venue returned a usable quote"
            );
            return Err(AggrError::NoLiquidity);
        };
        let alternatives: Vec<VenueQuote> = quotes.collect();

        info!(
            venue = %best.venue_id,
            input = %best.input_amount,
            output = %best.output_amount,
            gas = best.estimated_gas,
            alternatives = alternatives.len(),
            failures = failures.len(),
            "selected best quote"
        );

        Ok(QuoteSelection {
            best,
            alternatives,
            failures,
            venues_queried: self.providers.len(),
        })
    }
}

async fn query(
    index: usize,
    provider: &dyn VenueQuoteProvider,
    request: &TradeRequest,
    per_venue: Duration,
) -> Settled {
    let venue_id = provider.venue_id().to_string();
    let started = Instant::now();
    let result = match timeout(per_venue, provider.quote(request)).await {
        Ok(Ok(quote)) => {
            VENUE_QUOTE_LATENCY
                .with_label_values(&[venue_id.as_str()])
                .observe(started.elapsed().as_secs_f64());
            Ok(quote)
        }
        Ok(Err(err)) => {
            VENUE_QUOTE_LATENCY
                .with_label_values(&[venue_id.as_str()])
                .observe(started.elapsed().as_secs_f64());
            Err(match err {
                AggrError::Venue { .. } | AggrError::VenueTimeout { .. } => err,
                other => AggrError::venue(&venue_id, other),
            })
        }
        Err(_) => Err(AggrError::VenueTimeout {
            venue: venue_id.clone(),
            timeout_ms: per_venue.as_millis() as u64,
        }),
    };
    Settled {
        index,
        venue_id,
        result,
    }
}

/// Exclude quotes that answer a different question than the one asked.
fn admit(
    venue_id: &str,
    quote: VenueQuote,
    request: &TradeRequest,
    config: &ExecutorConfig,
) -> Result<VenueQuote, AggrError> {
    if quote.venue_id != venue_id {
        return Err(AggrError::venue(
            venue_id,
            format!("quote labelled for venue {}", quote.venue_id),
        ));
    }
    check_quote_shape(&quote, request)
        .and_then(|_| check_hops(&quote, config))
        .and_then(|_| compute_bounds(&quote, request.slippage_bps))
        .map_err(|err| AggrError::venue(venue_id, err))?;
    Ok(quote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::trade::{ProtocolFamily, RouteHint};
    use alloy_primitives::{Address, U256};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct MockVenue {
        id: String,
        delay: Duration,
        answer: Result<(u64, u64, u64), String>,
        calls: AtomicUsize,
    }

    impl MockVenue {
        fn ok(id: &str, delay_ms: u64, input: u64, output: u64, gas: u64) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                delay: Duration::from_millis(delay_ms),
                answer: Ok((input, output, gas)),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(id: &str, reason: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                delay: Duration::ZERO,
                answer: Err(reason.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VenueQuoteProvider for MockVenue {
        fn venue_id(&self) -> &str {
            &self.id
        }

        fn family(&self) -> ProtocolFamily {
            ProtocolFamily::ConstantProduct
        }

        async fn quote(&self, _request: &TradeRequest) -> Result<VenueQuote, AggrError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let (input, output, gas) = self
                .answer
                .clone()
                .map_err(AggrError::Provider)?;
            Ok(VenueQuote {
                venue_id: self.id.clone(),
                input_amount: U256::from(input),
                output_amount: U256::from(output),
                estimated_gas: gas,
                price_impact_bps: 10,
                route_hint: RouteHint::ConstantProduct {
                    path: vec![Address::repeat_byte(1), Address::repeat_byte(2)],
                },
            })
        }
    }

    fn request(direction: TradeDirection, amount: u64) -> TradeRequest {
        TradeRequest {
            input_token: Address::repeat_byte(1),
            output_token: Address::repeat_byte(2),
            amount: U256::from(amount),
            slippage_bps: 50,
            deadline_seconds: 60,
            recipient: Address::repeat_byte(3),
            direction,
            request_id: None,
        }
    }

    fn aggregator(venues: &[Arc<MockVenue>]) -> QuoteAggregator {
        QuoteAggregator::new(
            venues
                .iter()
                .map(|v| v.clone() as Arc<dyn VenueQuoteProvider>)
                .collect(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn highest_output_then_lowest_gas() {
        let venues = [
            MockVenue::ok("a", 5, 1_000, 100, 10),
            MockVenue::ok("b", 5, 1_000, 105, 8),
            MockVenue::ok("c", 5, 1_000, 105, 9),
        ];
        let selection = aggregator(&venues)
            .select(&request(TradeDirection::ExactInput, 1_000), &ExecutorConfig::default())
            .await
            .unwrap();
        assert_eq!(selection.best.venue_id, "b");
        let rest: Vec<_> = selection.alternatives.iter().map(|q| q.venue_id.as_str()).collect();
        assert_eq!(rest, vec!["c", "a"]);
        assert_eq!(selection.venues_queried, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn all_timeouts_mean_no_liquidity() {
        let venues = [
            MockVenue::ok("a", 5_000, 1_000, 100, 10),
            MockVenue::ok("b", 5_000, 1_000, 105, 8),
            MockVenue::ok("c", 5_000, 1_000, 105, 9),
        ];
        let config = ExecutorConfig {
            per_venue_timeout_ms: 100,
            ..Default::default()
        };
        let err = aggregator(&venues)
            .get_best_quote(&request(TradeDirection::ExactInput, 1_000), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, AggrError::NoLiquidity));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_and_timeouts_are_excluded() {
        let venues = [
            MockVenue::failing("broken", "execution reverted"),
            MockVenue::ok("slow", 5_000, 1_000, 500, 1),
            MockVenue::ok("ok", 10, 1_000, 90, 10),
        ];
        let config = ExecutorConfig {
            per_venue_timeout_ms: 100,
            ..Default::default()
        };
        let selection = aggregator(&venues)
            .select(&request(TradeDirection::ExactInput, 1_000), &config)
            .await
            .unwrap();
        assert_eq!(selection.best.venue_id, "ok");
        assert!(selection.alternatives.is_empty());
        let kinds: Vec<_> = selection
            .failures
            .iter()
            .map(|f| (f.venue_id.as_str(), f.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![("broken", ErrorKind::VenueError), ("slow", ErrorKind::VenueTimeout)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exact_output_prefers_lowest_input() {
        let venues = [
            MockVenue::ok("a", 1, 1_020, 500, 1),
            MockVenue::ok("b", 1, 1_010, 500, 9),
            MockVenue::ok("c", 1, 1_015, 500, 1),
        ];
        let best = aggregator(&venues)
            .get_best_quote(&request(TradeDirection::ExactOutput, 500), &ExecutorConfig::default())
            .await
            .unwrap();
        assert_eq!(best.venue_id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn exact_tie_goes_to_registration_order_not_arrival() {
        let venues = [
            MockVenue::ok("first", 50, 1_000, 105, 9),
            MockVenue::ok("second", 1, 1_000, 105, 9),
        ];
        let best = aggregator(&venues)
            .get_best_quote(&request(TradeDirection::ExactInput, 1_000), &ExecutorConfig::default())
            .await
            .unwrap();
        assert_eq!(best.venue_id, "first");
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_quotes_are_excluded() {
        let venues = [
            // answers for 999 instead of 1000
            MockVenue::ok("wrong-size", 1, 999, 10_000, 1),
            MockVenue::ok("zero-out", 1, 1_000, 0, 1),
            MockVenue::ok("good", 1, 1_000, 100, 1),
        ];
        let selection = aggregator(&venues)
            .select(&request(TradeDirection::ExactInput, 1_000), &ExecutorConfig::default())
            .await
            .unwrap();
        assert_eq!(selection.best.venue_id, "good");
        assert_eq!(selection.failures.len(), 2);
        assert!(selection.failures.iter().all(|f| f.kind == ErrorKind::VenueError));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_slippage_makes_no_calls() {
        let venues = [MockVenue::ok("a", 1, 1_000, 100, 1)];
        let mut req = request(TradeDirection::ExactInput, 1_000);
        req.slippage_bps = 5_001;
        let err = aggregator(&venues)
            .get_best_quote(&req, &ExecutorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AggrError::InvalidSlippage(5_001)));
        assert_eq!(venues[0].calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_venues_means_no_liquidity() {
        let err = QuoteAggregator::new(Vec::new())
            .get_best_quote(&request(TradeDirection::ExactInput, 1), &ExecutorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AggrError::NoLiquidity));
    }
}
