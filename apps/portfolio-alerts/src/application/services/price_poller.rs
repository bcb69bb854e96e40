//! Price Poller Service
//!
//! Runs the recurring price-alert cycle:
//!
//! 1. List every held symbol from the portfolio store.
//! 2. Fetch a quote per symbol (bounded concurrency, per-fetch timeout).
//! 3. Compare each quote with the last-price cache and overwrite the entry.
//! 4. For every threshold breach, resolve holders and push the alert to
//!    whichever of them has a live connection.
//!
//! Steps 2-4 run per symbol as one unit of work, so a slow symbol never
//! holds back the others.
//!
//! Every failure is contained inside the cycle that produced it. Cycles
//! never overlap: the scheduler waits for the running cycle and an
//! in-flight flag rejects concurrent manual triggers.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::application::ports::{
    AlertDeliveryPort, PortfolioStorePort, ProviderError, QuoteSourcePort, QuoteUnavailable,
};
use crate::domain::alerts::{DEFAULT_THRESHOLD_PCT, PriceAlert, PriceObservation};
use crate::domain::connections::ConnectionRegistry;
use crate::domain::market::{Quote, Symbol, UserId};
use crate::domain::price_cache::LastPriceCache;

/// Callback invoked with every completed cycle report.
pub type ReportHook = Box<dyn Fn(&CycleReport) + Send + Sync>;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the price poller.
#[derive(Debug, Clone)]
pub struct PricePollerConfig {
    /// Time between cycle starts.
    pub interval: Duration,
    /// Minimum absolute percentage move that raises an alert (exclusive).
    pub threshold_pct: Decimal,
    /// Upper bound on concurrent quote fetches and holder lookups.
    pub max_concurrent_fetches: usize,
    /// Deadline for a single quote fetch.
    pub quote_timeout: Duration,
    /// Deadline for a single portfolio store call.
    pub store_timeout: Duration,
}

impl Default for PricePollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            threshold_pct: DEFAULT_THRESHOLD_PCT,
            max_concurrent_fetches: 5,
            quote_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Cycle Report
// =============================================================================

/// Outcome of one polling cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Correlation id, also attached to the cycle's tracing span.
    pub cycle_id: Uuid,
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Symbol listing failed, so nothing else ran.
    pub listing_failed: bool,
    /// Distinct held symbols.
    pub symbols: usize,
    /// Quotes fetched successfully.
    pub quotes_fetched: usize,
    /// Quote fetches that failed or timed out.
    pub quote_failures: usize,
    /// Symbols seen for the first time.
    pub baselines: usize,
    /// Symbols whose move breached the threshold.
    pub alerts: usize,
    /// Holder lookups that failed or timed out.
    pub holder_lookup_failures: usize,
    /// Holders with no live connection.
    pub recipients_offline: usize,
    /// Alerts pushed successfully.
    pub deliveries: usize,
    /// Pushes that failed.
    pub delivery_failures: usize,
    /// Schedule ticks this cycle ran past, dropped by the scheduler.
    pub ticks_overrun: u64,
    /// Symbols in the last-price cache after the cycle.
    pub tracked_symbols: usize,
}

impl CycleReport {
    fn new(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            started_at: Utc::now(),
            duration_ms: 0,
            listing_failed: false,
            symbols: 0,
            quotes_fetched: 0,
            quote_failures: 0,
            baselines: 0,
            alerts: 0,
            holder_lookup_failures: 0,
            recipients_offline: 0,
            deliveries: 0,
            delivery_failures: 0,
            ticks_overrun: 0,
            tracked_symbols: 0,
        }
    }

    /// Fold one symbol's outcome into the totals.
    fn record(&mut self, outcome: SymbolOutcome) {
        match outcome {
            SymbolOutcome::QuoteFailed => self.quote_failures += 1,
            SymbolOutcome::Baseline => {
                self.quotes_fetched += 1;
                self.baselines += 1;
            }
            SymbolOutcome::Quiet => self.quotes_fetched += 1,
            SymbolOutcome::Alerted(fan_out) => {
                self.quotes_fetched += 1;
                self.alerts += 1;
                if fan_out.lookup_failed {
                    self.holder_lookup_failures += 1;
                }
                self.recipients_offline += fan_out.offline;
                self.deliveries += fan_out.delivered;
                self.delivery_failures += fan_out.failed;
            }
        }
    }
}

/// What happened to one symbol within a cycle.
#[derive(Debug)]
enum SymbolOutcome {
    QuoteFailed,
    Baseline,
    Quiet,
    Alerted(FanOut),
}

/// Per-alert fan-out result.
#[derive(Debug, Default)]
struct FanOut {
    lookup_failed: bool,
    offline: usize,
    delivered: usize,
    failed: usize,
}

/// Clears the in-flight flag when a cycle ends, including on unwind.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Poller
// =============================================================================

/// Recurring price poller and alert dispatcher.
pub struct PricePoller<Q, P, D>
where
    D: AlertDeliveryPort,
{
    config: PricePollerConfig,
    quotes: Arc<Q>,
    portfolios: Arc<P>,
    delivery: Arc<D>,
    registry: Arc<ConnectionRegistry<D::Handle>>,
    cache: LastPriceCache,
    in_flight: AtomicBool,
    cycles_completed: AtomicU64,
    last_report: RwLock<Option<CycleReport>>,
    report_hook: Option<ReportHook>,
}

impl<Q, P, D> PricePoller<Q, P, D>
where
    Q: QuoteSourcePort + 'static,
    P: PortfolioStorePort + 'static,
    D: AlertDeliveryPort + 'static,
{
    /// Create a poller with an empty last-price cache.
    #[must_use]
    pub fn new(
        config: PricePollerConfig,
        quotes: Arc<Q>,
        portfolios: Arc<P>,
        delivery: Arc<D>,
        registry: Arc<ConnectionRegistry<D::Handle>>,
    ) -> Self {
        Self {
            config,
            quotes,
            portfolios,
            delivery,
            registry,
            cache: LastPriceCache::new(),
            in_flight: AtomicBool::new(false),
            cycles_completed: AtomicU64::new(0),
            last_report: RwLock::new(None),
            report_hook: None,
        }
    }

    /// Invoke `hook` with every completed cycle report.
    #[must_use]
    pub fn with_report_hook(mut self, hook: impl Fn(&CycleReport) + Send + Sync + 'static) -> Self {
        self.report_hook = Some(Box::new(hook));
        self
    }

    /// Poller configuration.
    #[must_use]
    pub const fn config(&self) -> &PricePollerConfig {
        &self.config
    }

    /// Live connection registry alerts are routed through.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry<D::Handle> {
        &self.registry
    }

    /// Last observed prices.
    #[must_use]
    pub const fn cache(&self) -> &LastPriceCache {
        &self.cache
    }

    /// Number of cycles that ran to completion.
    #[must_use]
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Acquire)
    }

    /// Report of the most recent completed cycle.
    #[must_use]
    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().clone()
    }

    /// Whether a cycle is currently running.
    #[must_use]
    pub fn is_cycle_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Drive cycles on the configured interval until `shutdown` fires.
    ///
    /// The first cycle starts immediately. Each cycle runs in its own task
    /// so a panic is contained and logged; the schedule keeps going. Ticks
    /// missed while a slow cycle runs are skipped, not queued.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            threshold_pct = %self.config.threshold_pct,
            max_concurrent_fetches = self.config.max_concurrent_fetches,
            "Starting price poller"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let poller = Arc::clone(&self);
                    let cycle = tokio::spawn(async move { poller.run_cycle().await });

                    match cycle.await {
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            tracing::warn!("Previous price cycle still running, tick skipped");
                        }
                        Err(e) if e.is_panic() => {
                            tracing::error!("Price cycle panicked, continuing schedule");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Price cycle task failed");
                        }
                    }
                }
                () = shutdown.cancelled() => {
                    tracing::info!("Price poller shutting down");
                    break;
                }
            }
        }
    }

    /// Run one complete cycle now.
    ///
    /// Returns `None` without doing anything if another cycle is already in
    /// flight.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("price_cycle", %cycle_id);
        let report = self.execute_cycle(cycle_id).instrument(span).await;

        self.cycles_completed.fetch_add(1, Ordering::AcqRel);
        *self.last_report.write() = Some(report.clone());
        if let Some(hook) = &self.report_hook {
            hook(&report);
        }

        Some(report)
    }

    async fn execute_cycle(&self, cycle_id: Uuid) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::new(cycle_id);

        let symbols = match self.list_symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list held symbols");
                report.listing_failed = true;
                report.duration_ms = elapsed_ms(started);
                return report;
            }
        };

        report.symbols = symbols.len();
        if symbols.is_empty() {
            tracing::debug!("No held symbols, nothing to poll");
            report.duration_ms = elapsed_ms(started);
            return report;
        }

        let limit = self.config.max_concurrent_fetches.max(1);

        let mut outcomes = stream::iter(symbols)
            .map(|symbol| self.process_symbol(symbol))
            .buffer_unordered(limit);

        while let Some(outcome) = outcomes.next().await {
            report.record(outcome);
        }

        report.duration_ms = elapsed_ms(started);
        report.ticks_overrun = ticks_overrun(started.elapsed(), self.config.interval);
        report.tracked_symbols = self.cache.len();

        tracing::info!(
            symbols = report.symbols,
            quotes_fetched = report.quotes_fetched,
            quote_failures = report.quote_failures,
            baselines = report.baselines,
            alerts = report.alerts,
            deliveries = report.deliveries,
            delivery_failures = report.delivery_failures,
            recipients_offline = report.recipients_offline,
            duration_ms = report.duration_ms,
            ticks_overrun = report.ticks_overrun,
            "Price cycle completed"
        );

        report
    }

    /// Fetch, observe and, on a breach, alert holders for one symbol.
    async fn process_symbol(&self, symbol: Symbol) -> SymbolOutcome {
        let quote = match self.fetch_quote(&symbol).await {
            Ok(quote) => quote,
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "Quote unavailable, skipping symbol");
                return SymbolOutcome::QuoteFailed;
            }
        };

        match self.observe(&symbol, quote.price) {
            PriceObservation::Baseline => SymbolOutcome::Baseline,
            PriceObservation::Within { .. } | PriceObservation::Undefined => SymbolOutcome::Quiet,
            PriceObservation::Breach(alert) => SymbolOutcome::Alerted(self.notify_holders(&alert).await),
        }
    }

    /// Record the price and classify the move.
    fn observe(&self, symbol: &Symbol, price: Decimal) -> PriceObservation {
        let previous = self.cache.observe(symbol, price);
        let observation =
            PriceObservation::evaluate(symbol, previous, price, self.config.threshold_pct);

        match &observation {
            PriceObservation::Baseline => {
                tracing::debug!(symbol = %symbol, price = %price, "Baseline price recorded");
            }
            PriceObservation::Within { change_pct } => {
                tracing::trace!(symbol = %symbol, change_pct = %change_pct, "Price move below threshold");
            }
            PriceObservation::Undefined => {
                tracing::warn!(symbol = %symbol, price = %price, "Previous price was zero, change undefined");
            }
            PriceObservation::Breach(alert) => {
                tracing::info!(
                    symbol = %symbol,
                    previous = %alert.previous,
                    current = %alert.current,
                    change_pct = %alert.change_pct,
                    "Price alert"
                );
            }
        }

        observation
    }

    /// Push `alert` to every holder of its symbol that is online.
    async fn notify_holders(&self, alert: &PriceAlert) -> FanOut {
        let mut fan_out = FanOut::default();

        let holders = match self.holders_of(&alert.symbol).await {
            Ok(holders) => holders,
            Err(e) => {
                tracing::warn!(symbol = %alert.symbol, error = %e, "Holder lookup failed, alert dropped");
                fan_out.lookup_failed = true;
                return fan_out;
            }
        };

        let payload = alert.payload();
        for user in holders {
            let Some(handle) = self.registry.lookup(&user) else {
                fan_out.offline += 1;
                continue;
            };

            match self.delivery.deliver(&handle, &payload).await {
                Ok(()) => {
                    fan_out.delivered += 1;
                    tracing::debug!(user = %user, symbol = %alert.symbol, "Alert delivered");
                }
                Err(e) => {
                    fan_out.failed += 1;
                    tracing::warn!(user = %user, symbol = %alert.symbol, error = %e, "Alert delivery failed");
                }
            }
        }

        fan_out
    }

    async fn list_symbols(&self) -> Result<BTreeSet<Symbol>, ProviderError> {
        let after = self.config.store_timeout;
        match tokio::time::timeout(after, self.portfolios.list_distinct_symbols()).await {
            Ok(result) => result.map(|symbols| symbols.into_iter().map(normalize).collect()),
            Err(_) => Err(ProviderError::Timeout {
                operation: "list_distinct_symbols",
                after,
            }),
        }
    }

    async fn holders_of(&self, symbol: &Symbol) -> Result<BTreeSet<UserId>, ProviderError> {
        let after = self.config.store_timeout;
        tokio::time::timeout(after, self.portfolios.get_holders(symbol))
            .await
            .unwrap_or(Err(ProviderError::Timeout {
                operation: "get_holders",
                after,
            }))
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, QuoteUnavailable> {
        let after = self.config.quote_timeout;
        tokio::time::timeout(after, self.quotes.fetch_quote(symbol))
            .await
            .unwrap_or_else(|_| {
                Err(QuoteUnavailable::Timeout {
                    symbol: symbol.to_string(),
                    after,
                })
            })
    }
}

/// Re-apply ticker normalization to whatever the store returned.
fn normalize(symbol: Symbol) -> Symbol {
    Symbol::new(symbol.as_str())
}

fn ticks_overrun(elapsed: Duration, interval: Duration) -> u64 {
    if interval.is_zero() {
        return 0;
    }
    u64::try_from(elapsed.as_nanos() / interval.as_nanos()).unwrap_or(u64::MAX)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
