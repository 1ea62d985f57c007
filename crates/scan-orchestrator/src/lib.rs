//! The scheduler + per-scan pipeline that wires C1-C9 together and
//! enforces the one-scan-at-a-time invariant (spec §2 C10, §4.1).

mod pipeline;

use chrono::{Duration as ChronoDuration, Local, NaiveTime, Utc};
use futures_util::FutureExt;
use progress_bus::ProgressBus;
use scan_core::{
    MarketAggregator, OptionsDiscoveryService, ScanConfig, ScanError, ScanEvent, ScanLog,
    ScanStatus,
};
use scan_state_tracker::ScanStateTracker;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use stock_data_store::StockDataStore;
use strategy_engine::StrategyEngine;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Back-off after a scheduler-loop crash before retrying (spec §4.1
/// "Failure semantics").
const SCHEDULER_CRASH_BACKOFF: StdDuration = StdDuration::from_secs(5 * 60);

/// Wires C1-C9 into the scheduler + pipeline described by spec §4.1.
///
/// `MarketDataAggregator` is consumed through the [`MarketAggregator`]
/// trait object rather than the concrete `market-data-aggregator` crate
/// type, so tests exercise this orchestrator against an in-memory fake
/// instead of real HTTP adapters.
pub struct ScanOrchestrator {
    config: ScanConfig,
    aggregator: Arc<dyn MarketAggregator>,
    discovery: Option<Arc<dyn OptionsDiscoveryService>>,
    engine: StrategyEngine,
    store: Arc<StockDataStore>,
    tracker: Arc<ScanStateTracker>,
    bus: ProgressBus,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl ScanOrchestrator {
    pub fn new(
        config: ScanConfig,
        aggregator: Arc<dyn MarketAggregator>,
        discovery: Option<Arc<dyn OptionsDiscoveryService>>,
        engine: StrategyEngine,
        store: Arc<StockDataStore>,
        tracker: Arc<ScanStateTracker>,
        bus: ProgressBus,
    ) -> Arc<Self> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Arc::new(Self {
            config,
            aggregator,
            discovery,
            engine,
            store,
            tracker,
            bus,
            cancel_tx,
            cancel_rx,
            scheduler_task: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    pub fn progress_bus(&self) -> &ProgressBus {
        &self.bus
    }

    pub fn tracker(&self) -> &Arc<ScanStateTracker> {
        &self.tracker
    }

    /// Begin background scheduling. Idempotent: calling this more than
    /// once is a no-op (spec §4.1 "start()").
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.supervise_scheduler().await });

        // `try_lock` can't contend here: nothing else touches this mutex
        // until `stop` runs, which only happens after `start` returns.
        if let Ok(mut slot) = self.scheduler_task.try_lock() {
            *slot = Some(handle);
        }
    }

    /// Cancel any in-flight scan and stop the scheduler, waiting up to
    /// `deadline` for both to wind down (spec §4.1 "stop(deadline)").
    pub async fn stop(self: &Arc<Self>, deadline: StdDuration) {
        let _ = self.cancel_tx.send(true);

        let handle = self.scheduler_task.lock().await.take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(deadline, handle).await;
        }
    }

    /// Attempt to start a scan immediately (spec §4.1 "triggerNow()").
    /// Fails with `ErrScanInProgress` if the guard is already held;
    /// otherwise spawns the pipeline and returns as soon as the guard is
    /// acquired, without waiting for the scan to finish.
    pub async fn trigger_now(self: &Arc<Self>) -> Result<(), ScanError> {
        let log = self.acquire_guard().await?;

        let this = Arc::clone(self);
        let cancel_rx = self.cancel_rx.clone();
        tokio::spawn(async move { this.run_pipeline(log, cancel_rx).await });

        Ok(())
    }

    /// The strict guard (spec §4.1 "Guard (strict)"): reserve the
    /// `ScanLog` id and flip `ScanStateTracker.inProgress` atomically
    /// before any pipeline work begins. `total` is filled in later, once
    /// the universe is known (see `ScanStateTracker::set_total`).
    async fn acquire_guard(&self) -> Result<ScanLog, ScanError> {
        let log = ScanLog::open(Utc::now());
        self.tracker.try_start(log.id, 0).await?;
        Ok(log)
    }

    /// Supervises the scheduler loop, restarting it after a 5-minute
    /// back-off if it ever panics (spec §4.1 "Scheduler loop crash").
    async fn supervise_scheduler(self: Arc<Self>) {
        loop {
            if *self.cancel_rx.borrow() {
                return;
            }

            let this = Arc::clone(&self);
            let cancel_rx = self.cancel_rx.clone();
            let outcome = AssertUnwindSafe(this.scheduler_loop(cancel_rx))
                .catch_unwind()
                .await;

            if *self.cancel_rx.borrow() {
                return;
            }

            match outcome {
                Ok(()) => return,
                Err(_) => {
                    tracing::error!("scheduler loop panicked, backing off before retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(SCHEDULER_CRASH_BACKOFF) => {}
                        _ = self.cancel_rx.clone().changed() => {}
                    }
                }
            }
        }
    }

    /// Computes the next daily wall-clock target, sleeps until it (or
    /// cancellation), then invokes the pipeline directly — sequential,
    /// since only one scan may run at a time process-wide (spec §4.1
    /// "Scheduling").
    async fn scheduler_loop(self: Arc<Self>, mut cancel_rx: watch::Receiver<bool>) {
        loop {
            if *cancel_rx.borrow() {
                return;
            }

            let sleep_for = duration_until_next_target(self.config.scan_time);
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        return;
                    }
                    continue;
                }
            }

            if *cancel_rx.borrow() {
                return;
            }

            match self.acquire_guard().await {
                Ok(log) => self.clone().run_pipeline(log, cancel_rx.clone()).await,
                Err(ScanError::ErrScanInProgress) => {
                    tracing::warn!("scheduled scan skipped: a scan is already in progress");
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to start scheduled scan");
                }
            }
        }
    }

    /// Runs the guarded pipeline to completion, catching any panic that
    /// escapes it (spec §4.1 step 7) and always tearing down tracker
    /// state and emitting `ScanCompleted` on every exit path.
    async fn run_pipeline(self: Arc<Self>, mut log: ScanLog, mut cancel_rx: watch::Receiver<bool>) {
        let outcome = AssertUnwindSafe(self.execute_pipeline_body(&mut log, &mut cancel_rx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                log.status = ScanStatus::Failed;
                log.error_message = Some(reason);
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(scan_id = %log.id, %message, "scan pipeline panicked");
                log.status = ScanStatus::Failed;
                log.error_message = Some(format!("unexpected error: {message}"));
            }
        }

        log.completed_at = Some(Utc::now());
        if let Err(e) = self.store.update_scan_log(&log).await {
            tracing::error!(scan_id = %log.id, error = %e, "failed to close scan log");
        }

        self.tracker.complete().await;
        tracing::info!(
            scan_id = %log.id,
            status = ?log.status,
            symbols_scanned = log.symbols_scanned,
            recommendations_generated = log.recommendations_generated,
            "scan finished"
        );
        self.bus.publish(ScanEvent::from_scan_log(&log));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Next occurrence of `target` local wall-clock time, at least one second
/// away; if `target` has already passed today, schedules for tomorrow
/// (spec §4.1 "Scheduling").
fn duration_until_next_target(target: NaiveTime) -> StdDuration {
    let now = Local::now();
    let today_target = now.date_naive().and_time(target);

    let next = if today_target > now.naive_local() {
        today_target
    } else {
        today_target + ChronoDuration::days(1)
    };

    let delta = next - now.naive_local();
    delta.to_std().unwrap_or(StdDuration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scan_core::{
        AggregatedMarketData, MarketData, OptionContract, StrategyConfig, Symbol, TrendAnalysis,
        TrendDirection,
    };
    use std::sync::atomic::AtomicUsize;

    struct FixedAggregator {
        confidence_by_symbol: std::collections::HashMap<String, f64>,
    }

    #[async_trait]
    impl MarketAggregator for FixedAggregator {
        async fn aggregate(&self, symbol: &Symbol) -> Result<AggregatedMarketData, ScanError> {
            let confidence = *self
                .confidence_by_symbol
                .get(symbol.as_str())
                .unwrap_or(&0.0);

            Ok(AggregatedMarketData {
                market_data: Some(MarketData {
                    current_price: 100.0,
                    volume: 1_000_000,
                    as_of: Utc::now(),
                }),
                trend_analysis: Some(TrendAnalysis {
                    direction: TrendDirection::Up,
                    confidence,
                    trend_strength: 0.6,
                    expected_growth_percent: 2.0,
                }),
                options: vec![OptionContract {
                    strike: 95.0,
                    expiry: chrono::NaiveDate::from_ymd_opt(2026, 8, 14).unwrap(),
                    days_to_expiry: 16,
                    premium: 1.2,
                    implied_volatility: 0.3,
                    open_interest: 400,
                    volume: 80,
                }],
                dividend_info: None,
                financial_health: None,
            })
        }
    }

    async fn store() -> Arc<StockDataStore> {
        Arc::new(StockDataStore::connect("sqlite::memory:").await.unwrap())
    }

    fn orchestrator_with(
        config: ScanConfig,
        aggregator: Arc<dyn MarketAggregator>,
        store: Arc<StockDataStore>,
    ) -> Arc<ScanOrchestrator> {
        let engine = StrategyEngine::with_default_strategies(&StrategyConfig {
            min_confidence: 0.1,
            ..config.strategy.clone()
        });
        ScanOrchestrator::new(
            config,
            aggregator,
            None,
            engine,
            store,
            Arc::new(ScanStateTracker::new()),
            ProgressBus::new(),
        )
    }

    #[tokio::test]
    async fn trigger_now_twice_in_a_row_rejects_the_second_call() {
        let store = store().await;
        let mut config = ScanConfig::default();
        config.watchlist = vec![Symbol::new("AAA").unwrap()];

        let aggregator = Arc::new(FixedAggregator {
            confidence_by_symbol: [("AAA".to_string(), 0.8)].into_iter().collect(),
        });
        let orchestrator = orchestrator_with(config, aggregator, store);

        orchestrator.trigger_now().await.unwrap();
        let second = orchestrator.trigger_now().await;
        assert!(matches!(second, Err(ScanError::ErrScanInProgress)));

        orchestrator.stop(StdDuration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn successful_scan_emits_bracketed_events_in_order() {
        let store = store().await;
        let mut config = ScanConfig::default();
        config.watchlist = vec![Symbol::new("AAA").unwrap(), Symbol::new("BBB").unwrap()];

        let aggregator = Arc::new(FixedAggregator {
            confidence_by_symbol: [("AAA".to_string(), 0.8), ("BBB".to_string(), 0.7)]
                .into_iter()
                .collect(),
        });
        let orchestrator = orchestrator_with(config, aggregator, store);

        let mut sub = orchestrator.progress_bus().subscribe(None);
        orchestrator.trigger_now().await.unwrap();

        let mut events = Vec::new();
        for _ in 0..6 {
            events.push(sub.recv().await.unwrap());
        }

        assert!(matches!(events[0], ScanEvent::ScanStarted { total_symbols: 2, .. }));
        assert!(matches!(events[1], ScanEvent::SymbolScanning { current_index: 0, .. }));
        assert!(matches!(events[2], ScanEvent::SymbolCompleted { current_index: 0, .. }));
        assert!(matches!(events[3], ScanEvent::SymbolScanning { current_index: 1, .. }));
        assert!(matches!(events[4], ScanEvent::SymbolCompleted { current_index: 1, .. }));
        assert!(matches!(
            events[5],
            ScanEvent::ScanCompleted { status: ScanStatus::Succeeded, symbols_scanned: 2, .. }
        ));
    }

    #[tokio::test]
    async fn per_symbol_aggregation_failure_emits_symbol_error_and_continues() {
        struct FlakyAggregator {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl MarketAggregator for FlakyAggregator {
            async fn aggregate(&self, _symbol: &Symbol) -> Result<AggregatedMarketData, ScanError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(ScanError::ProviderError("boom".to_string()))
            }
        }

        let store = store().await;
        let mut config = ScanConfig::default();
        config.watchlist = vec![Symbol::new("AAA").unwrap()];

        let orchestrator = orchestrator_with(
            config,
            Arc::new(FlakyAggregator {
                calls: AtomicUsize::new(0),
            }),
            store,
        );

        let mut sub = orchestrator.progress_bus().subscribe(None);
        orchestrator.trigger_now().await.unwrap();

        let started = sub.recv().await.unwrap();
        assert!(matches!(started, ScanEvent::ScanStarted { .. }));
        let scanning = sub.recv().await.unwrap();
        assert!(matches!(scanning, ScanEvent::SymbolScanning { .. }));
        let error = sub.recv().await.unwrap();
        assert!(matches!(error, ScanEvent::SymbolError { .. }));
        let completed = sub.recv().await.unwrap();
        assert!(matches!(
            completed,
            ScanEvent::ScanCompleted { status: ScanStatus::Succeeded, recommendations_generated: 0, .. }
        ));
    }

    #[tokio::test]
    async fn cancellation_mid_scan_closes_the_log_as_failed() {
        let store = store().await;
        let mut config = ScanConfig::default();
        config.watchlist = vec![
            Symbol::new("AAA").unwrap(),
            Symbol::new("BBB").unwrap(),
            Symbol::new("CCC").unwrap(),
        ];

        let aggregator = Arc::new(FixedAggregator {
            confidence_by_symbol: [
                ("AAA".to_string(), 0.8),
                ("BBB".to_string(), 0.7),
                ("CCC".to_string(), 0.6),
            ]
            .into_iter()
            .collect(),
        });
        let orchestrator = orchestrator_with(config, aggregator, store);

        let mut sub = orchestrator.progress_bus().subscribe(None);
        orchestrator.trigger_now().await.unwrap();

        let _started = sub.recv().await.unwrap();
        let _scanning_0 = sub.recv().await.unwrap();
        let completed_0 = sub.recv().await.unwrap();
        assert!(matches!(completed_0, ScanEvent::SymbolCompleted { current_index: 0, .. }));

        let _ = orchestrator.cancel_tx.send(true);

        let terminal = sub.recv().await.unwrap();
        assert!(matches!(
            terminal,
            ScanEvent::ScanCompleted { status: ScanStatus::Failed, .. }
        ));
        if let ScanEvent::ScanCompleted { error_message, .. } = terminal {
            assert!(error_message.unwrap().contains("cancelled"));
        }
    }

    #[test]
    fn next_target_rolls_over_to_tomorrow_when_already_past() {
        let past = (Local::now() - ChronoDuration::hours(1)).time();
        let dur = duration_until_next_target(past);
        assert!(dur.as_secs() > 23 * 60 * 60);
    }
}
