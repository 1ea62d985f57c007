//! The per-scan pipeline body (spec §4.1 "Pipeline (one scan)").

use crate::ScanOrchestrator;
use chrono::Utc;
use scan_core::{OptionContract, Recommendation, ScanEventMetrics, ScanLog, ScanStatus, Symbol};
use std::collections::BTreeSet;
use tokio::sync::watch;

impl ScanOrchestrator {
    /// Step 2: candidate universe, deduplicated and lexicographically
    /// sorted for determinism. Discovery is tried first when enabled;
    /// on failure, falls back to the persisted watchlist, itself falling
    /// back to the statically configured one if the store has nothing
    /// saved yet (spec §4.1 step 2, open question resolved in DESIGN.md).
    pub(crate) async fn determine_universe(&self) -> Result<Vec<Symbol>, scan_core::ScanError> {
        let mut symbols: BTreeSet<Symbol> = BTreeSet::new();

        let from_discovery = if self.config.options_discovery.enabled {
            match &self.discovery {
                Some(discovery) => match discovery.discover_underlyings().await {
                    Ok(found) => Some(found),
                    Err(e) => {
                        tracing::warn!(error = %e, "options discovery failed");
                        None
                    }
                },
                None => {
                    tracing::warn!("options discovery enabled but no discovery service configured");
                    None
                }
            }
        } else {
            None
        };

        match from_discovery {
            Some(found) => symbols.extend(found),
            None => {
                if self.config.options_discovery.enabled
                    && !self.config.options_discovery.fallback_to_watchlist
                {
                    return Err(scan_core::ScanError::ProviderError(
                        "options discovery failed and watchlist fallback disabled".to_string(),
                    ));
                }
                symbols.extend(self.fallback_watchlist().await);
            }
        }

        Ok(symbols.into_iter().collect())
    }

    async fn fallback_watchlist(&self) -> Vec<Symbol> {
        match self.store.get_watchlist().await {
            Ok(stored) if !stored.is_empty() => stored,
            Ok(_) => self.config.watchlist.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read persisted watchlist, using configured default");
                self.config.watchlist.clone()
            }
        }
    }

    /// Runs steps 1-6 of the pipeline for an already-guarded `log`. Any
    /// panic escaping this body is caught by the caller (spec §4.1 step 7);
    /// a cancellation mid-loop returns `Err("cancelled")` so the caller
    /// closes the log as `Failed` with that reason.
    pub(crate) async fn execute_pipeline_body(
        &self,
        log: &mut ScanLog,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), String> {
        if let Err(e) = self.store.insert_scan_log(log).await {
            return Err(format!("failed to open scan log: {e}"));
        }

        let universe = self
            .determine_universe()
            .await
            .map_err(|e| format!("universe determination failed: {e}"))?;
        let total = universe.len();

        self.tracker.set_total(total).await;
        let started = scan_core::ScanEvent::ScanStarted {
            scan_log_id: log.id,
            total_symbols: total,
            scanned_count: None,
            current_symbol: None,
            timestamp: Utc::now(),
        };
        tracing::info!(scan_id = %log.id, total, "scan started");
        self.bus.publish(started);

        let mut symbols_scanned: i64 = 0;
        let mut recommendations_generated: i64 = 0;

        for (index, symbol) in universe.into_iter().enumerate() {
            if *cancel_rx.borrow() {
                return Err("cancelled".to_string());
            }

            self.tracker.update_progress(symbol.clone(), index).await;
            self.bus.publish(scan_core::ScanEvent::SymbolScanning {
                symbol: symbol.clone(),
                current_index: index,
                total_symbols: total,
                progress_percent: scan_core::progress_percent(index, total),
                timestamp: Utc::now(),
            });
            tracing::debug!(%symbol, index, total, "scanning symbol");

            let aggregated = match self.aggregator.aggregate(&symbol).await {
                Ok(data) => data,
                Err(e) => {
                    symbols_scanned += 1;
                    tracing::warn!(%symbol, error = %e, "aggregation failed for symbol");
                    self.bus.publish(scan_core::ScanEvent::SymbolError {
                        symbol,
                        current_index: index,
                        total_symbols: total,
                        progress_percent: scan_core::progress_percent(index, total),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    continue;
                }
            };

            let recommendations = self.engine.evaluate(&symbol, &aggregated);
            recommendations_generated += recommendations.len() as i64;

            let write_result = match recommendations.first() {
                Some(top) => {
                    self.upsert_top_recommendation(&symbol, top, &aggregated.options)
                        .await
                }
                None => Ok(()),
            };

            symbols_scanned += 1;
            match write_result {
                Ok(()) => {
                    let metrics = aggregated.financial_health.map(|health| ScanEventMetrics {
                        piotroski_f_score: Some(health.piotroski_f_score),
                        altman_z_score: Some(health.altman_z_score),
                    });
                    tracing::info!(
                        %symbol,
                        index,
                        recommendations = recommendations.len(),
                        "symbol completed"
                    );
                    self.bus.publish(scan_core::ScanEvent::SymbolCompleted {
                        symbol,
                        current_index: index,
                        total_symbols: total,
                        progress_percent: scan_core::progress_percent(index, total),
                        recommendations_count: recommendations.len(),
                        metrics,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    tracing::warn!(%symbol, error = %e, "store write failed for symbol");
                    self.bus.publish(scan_core::ScanEvent::SymbolError {
                        symbol,
                        current_index: index,
                        total_symbols: total,
                        progress_percent: scan_core::progress_percent(index, total),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }

            // Yield here, not just check a flag: this is the one point
            // between symbols where a concurrently-issued cancellation is
            // guaranteed to be observed before the next `SymbolScanning`
            // fires (spec §4.1 "the loop checks the signal between
            // symbols").
            tokio::task::yield_now().await;
        }

        log.symbols_scanned = symbols_scanned;
        log.recommendations_generated = recommendations_generated;
        log.status = ScanStatus::Succeeded;

        if let Err(e) = self
            .store
            .delete_stale_records(chrono::Duration::days(self.config.retention_days))
            .await
        {
            tracing::warn!(error = %e, "retention sweep failed");
        }

        Ok(())
    }

    async fn upsert_top_recommendation(
        &self,
        symbol: &Symbol,
        top: &Recommendation,
        options: &[OptionContract],
    ) -> Result<(), scan_core::ScanError> {
        let matching_option = options
            .iter()
            .find(|o| o.expiry == top.expiry && (o.strike - top.strike_price).abs() < 1e-9);

        let update = stock_data_store::MarketLayerUpdate {
            current_price: top.current_price,
            strike_price: top.strike_price,
            expiry: top.expiry,
            days_to_expiry: top.days_to_expiry,
            premium: top.premium,
            breakeven: top.breakeven,
            confidence: top.confidence,
            expected_growth_percent: top.expected_growth_percent,
            strategy_name: top.strategy_name.clone(),
            exchange_symbol: None,
            option_price: matching_option.map(|o| o.premium).unwrap_or(top.premium),
            volume: matching_option.map(|o| o.volume).unwrap_or(0),
            open_interest: matching_option.map(|o| o.open_interest).unwrap_or(0),
        };

        self.store.upsert_market_layer(symbol, &update).await
    }
}
