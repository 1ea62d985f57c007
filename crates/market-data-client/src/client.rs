use crate::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use scan_core::{
    DividendInfo, MarketData, MarketDataProvider, OptionContract, OptionsDataProvider,
    OptionsDiscoveryConfig, OptionsDiscoveryService, RateLimitingConfig, ScanError, Symbol,
    TrendAnalysis, TrendDirection,
};
use serde::Deserialize;
use std::time::Duration;

/// HTTP-backed [`MarketDataProvider`] + [`OptionsDataProvider`] +
/// [`OptionsDiscoveryService`], grounded in the rate-limited
/// `send_request` pattern used for the vendor feed elsewhere in this
/// workspace: a sliding-window limiter in front of every call, automatic
/// retry with exponential backoff, and `Retry-After`-aware handling of
/// HTTP 429.
pub struct MarketDataClient {
    base_url: String,
    api_key: String,
    http: Client,
    rate_limiter: RateLimiter,
    rate_limiting: RateLimitingConfig,
    options_discovery: OptionsDiscoveryConfig,
}

impl MarketDataClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_config(
            base_url,
            api_key,
            RateLimitingConfig::default(),
            OptionsDiscoveryConfig::default(),
        )
    }

    pub fn with_config(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        rate_limiting: RateLimitingConfig,
        options_discovery: OptionsDiscoveryConfig,
    ) -> Self {
        let max_requests: usize = std::env::var("MARKET_DATA_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        let http = Client::builder()
            .timeout(Duration::from_secs(rate_limiting.attempt_timeout_seconds))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http,
            rate_limiter: RateLimiter::new(max_requests, Duration::from_secs(60)),
            rate_limiting,
            options_discovery,
        }
    }

    /// Issue `builder`, retrying transient failures and 429s per
    /// `rate_limiting` (spec §5 "Resilience").
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ScanError> {
        let request = builder
            .build()
            .map_err(|e| ScanError::ProviderError(e.to_string()))?;

        let mut delay = Duration::from_secs(self.rate_limiting.initial_retry_delay_seconds);

        for attempt in 0..=self.rate_limiting.max_retries {
            self.rate_limiter.acquire().await;

            let attempt_request = request
                .try_clone()
                .ok_or_else(|| ScanError::ProviderError("request body is not cloneable".to_string()))?;

            let outcome = tokio::time::timeout(
                Duration::from_secs(self.rate_limiting.attempt_timeout_seconds),
                self.http.execute(attempt_request),
            )
            .await;

            let response = match outcome {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => {
                    if attempt == self.rate_limiting.max_retries {
                        return Err(ScanError::ProviderError(e.to_string()));
                    }
                    tracing::warn!("market data request failed ({}), retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    delay = Self::next_delay(delay, self.rate_limiting.use_exponential_backoff);
                    continue;
                }
                Err(_) => {
                    if attempt == self.rate_limiting.max_retries {
                        return Err(ScanError::TransientProviderError(
                            "request timed out".to_string(),
                        ));
                    }
                    tracing::warn!("market data request timed out, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    delay = Self::next_delay(delay, self.rate_limiting.use_exponential_backoff);
                    continue;
                }
            };

            if response.status().as_u16() == 429 && self.rate_limiting.enable_retry_on_429 {
                if attempt == self.rate_limiting.max_retries {
                    return Err(ScanError::TransientProviderError(
                        "rate limited after exhausting retries".to_string(),
                    ));
                }
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(delay);
                tracing::warn!("market data 429, waiting {:?} before retry {}", retry_after, attempt + 1);
                tokio::time::sleep(retry_after).await;
                delay = Self::next_delay(delay, self.rate_limiting.use_exponential_backoff);
                continue;
            }

            if response.status().is_server_error() && attempt < self.rate_limiting.max_retries {
                tracing::warn!("market data server error {}, retrying in {:?}", response.status(), delay);
                tokio::time::sleep(delay).await;
                delay = Self::next_delay(delay, self.rate_limiting.use_exponential_backoff);
                continue;
            }

            return Ok(response);
        }

        Err(ScanError::TransientProviderError("retries exhausted".to_string()))
    }

    fn next_delay(current: Duration, exponential: bool) -> Duration {
        if exponential {
            current * 2
        } else {
            current
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Debug, Deserialize)]
struct BarsResponse {
    bars: Vec<BarPayload>,
}

#[derive(Debug, Deserialize)]
struct BarPayload {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: i64,
}

#[derive(Debug, Deserialize)]
struct QuotePayload {
    price: f64,
    volume: i64,
    #[serde(rename = "asOf")]
    as_of: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct DividendPayload {
    #[serde(rename = "exDividendDate")]
    ex_dividend_date: NaiveDate,
    #[serde(rename = "cashAmount")]
    cash_amount: f64,
}

#[derive(Debug, Deserialize)]
struct OptionContractPayload {
    strike: f64,
    expiry: NaiveDate,
    #[serde(rename = "daysToExpiry")]
    days_to_expiry: i64,
    premium: f64,
    #[serde(rename = "impliedVolatility")]
    implied_volatility: f64,
    #[serde(rename = "openInterest")]
    open_interest: i64,
    volume: i64,
}

impl From<OptionContractPayload> for OptionContract {
    fn from(p: OptionContractPayload) -> Self {
        OptionContract {
            strike: p.strike,
            expiry: p.expiry,
            days_to_expiry: p.days_to_expiry,
            premium: p.premium,
            implied_volatility: p.implied_volatility,
            open_interest: p.open_interest,
            volume: p.volume,
        }
    }
}

#[async_trait]
impl MarketDataProvider for MarketDataClient {
    async fn get_market_data(&self, symbol: &Symbol) -> Result<Option<MarketData>, ScanError> {
        let url = self.endpoint(&format!("/v1/quote/{}", symbol.as_str()));
        let response = self
            .send(self.http.get(&url).query(&[("apiKey", &self.api_key)]))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ScanError::ProviderError(format!(
                "quote request for {} failed: HTTP {}",
                symbol,
                response.status()
            )));
        }

        let payload: QuotePayload = response
            .json()
            .await
            .map_err(|e| ScanError::DataValidationError(e.to_string()))?;

        Ok(Some(MarketData {
            current_price: payload.price,
            volume: payload.volume,
            as_of: payload.as_of,
        }))
    }

    async fn analyse_trend(&self, symbol: &Symbol, days: i64) -> Result<TrendAnalysis, ScanError> {
        let to = Utc::now();
        let from = to - chrono::Duration::days(days);
        let url = self.endpoint(&format!("/v1/bars/{}", symbol.as_str()));
        let response = self
            .send(self.http.get(&url).query(&[
                ("apiKey", self.api_key.clone()),
                ("from", from.format("%Y-%m-%d").to_string()),
                ("to", to.format("%Y-%m-%d").to_string()),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(ScanError::ProviderError(format!(
                "bars request for {} failed: HTTP {}",
                symbol,
                response.status()
            )));
        }

        let payload: BarsResponse = response
            .json()
            .await
            .map_err(|e| ScanError::DataValidationError(e.to_string()))?;

        Ok(trend_from_closes(&payload.bars))
    }

    async fn get_dividends(&self, symbol: &Symbol) -> Result<Vec<DividendInfo>, ScanError> {
        let url = self.endpoint(&format!("/v1/dividends/{}", symbol.as_str()));
        let response = self
            .send(self.http.get(&url).query(&[("apiKey", &self.api_key), ("limit", &"12".to_string())]))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(ScanError::ProviderError(format!(
                "dividends request for {} failed: HTTP {}",
                symbol,
                response.status()
            )));
        }

        let payload: Vec<DividendPayload> = response
            .json()
            .await
            .map_err(|e| ScanError::DataValidationError(e.to_string()))?;

        Ok(payload
            .into_iter()
            .map(|d| DividendInfo {
                ex_dividend_date: d.ex_dividend_date,
                cash_amount: d.cash_amount,
            })
            .collect())
    }
}

#[async_trait]
impl OptionsDataProvider for MarketDataClient {
    async fn get_short_term_put_options(
        &self,
        symbol: &Symbol,
        min_days: i64,
        max_days: i64,
    ) -> Result<Vec<OptionContract>, ScanError> {
        let url = self.endpoint(&format!("/v1/options/{}/puts", symbol.as_str()));
        let response = self
            .send(self.http.get(&url).query(&[
                ("apiKey", self.api_key.clone()),
                ("minDays", min_days.to_string()),
                ("maxDays", max_days.to_string()),
            ]))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(ScanError::ProviderError(format!(
                "options chain request for {} failed: HTTP {}",
                symbol,
                response.status()
            )));
        }

        let payload: Vec<OptionContractPayload> = response
            .json()
            .await
            .map_err(|e| ScanError::DataValidationError(e.to_string()))?;

        Ok(payload
            .into_iter()
            .filter(|c| c.days_to_expiry >= min_days && c.days_to_expiry <= max_days)
            .map(OptionContract::from)
            .collect())
    }
}

#[async_trait]
impl OptionsDiscoveryService for MarketDataClient {
    async fn discover_underlyings(&self) -> Result<Vec<Symbol>, ScanError> {
        if !self.options_discovery.enabled {
            return Ok(Vec::new());
        }

        let url = self.endpoint("/v1/options/underlyings");
        let response = self
            .send(self.http.get(&url).query(&[
                ("apiKey", self.api_key.clone()),
                ("minOpenInterest", self.options_discovery.min_open_interest.to_string()),
                ("minVolume", self.options_discovery.min_volume.to_string()),
                ("maxExpiryDays", self.options_discovery.max_expiry_days.to_string()),
                (
                    "sampleOptionsPerUnderlying",
                    self.options_discovery.sample_options_per_underlying.to_string(),
                ),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(ScanError::ProviderError(format!(
                "underlying discovery failed: HTTP {}",
                response.status()
            )));
        }

        let payload: Vec<String> = response
            .json()
            .await
            .map_err(|e| ScanError::DataValidationError(e.to_string()))?;

        payload.into_iter().map(Symbol::new).collect()
    }
}

/// Trend from a simple-moving-average crossover of the last N closes:
/// compares the average of the most recent third against the average of
/// the earliest third, normalizing both confidence and magnitude to the
/// observed volatility so a quiet, steadily-rising stock and a choppy
/// one don't get the same score.
fn trend_from_closes(bars: &[BarPayload]) -> TrendAnalysis {
    if bars.len() < 3 {
        return TrendAnalysis {
            direction: TrendDirection::Sideways,
            confidence: 0.0,
            trend_strength: 0.0,
            expected_growth_percent: 0.0,
        };
    }

    let third = (bars.len() / 3).max(1);
    let early: Vec<f64> = bars[..third].iter().map(|b| b.close).collect();
    let late: Vec<f64> = bars[bars.len() - third..].iter().map(|b| b.close).collect();

    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
    let early_mean = mean(&early);
    let late_mean = mean(&late);

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let overall_mean = mean(&closes);
    let variance = closes.iter().map(|c| (c - overall_mean).powi(2)).sum::<f64>() / closes.len() as f64;
    let volatility = variance.sqrt().max(f64::EPSILON);

    let growth_percent = if early_mean.abs() > f64::EPSILON {
        (late_mean - early_mean) / early_mean * 100.0
    } else {
        0.0
    };

    let direction = if growth_percent > 1.0 {
        TrendDirection::Up
    } else if growth_percent < -1.0 {
        TrendDirection::Down
    } else {
        TrendDirection::Sideways
    };

    let signal_to_noise = (late_mean - early_mean).abs() / volatility;
    let trend_strength = (signal_to_noise / 10.0).clamp(0.0, 1.0);
    let confidence = (0.4 + trend_strength * 0.6).clamp(0.0, 1.0);

    TrendAnalysis {
        direction,
        confidence,
        trend_strength,
        expected_growth_percent: growth_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64) -> BarPayload {
        BarPayload {
            timestamp: Utc::now(),
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn flat_series_is_sideways() {
        let bars: Vec<BarPayload> = (0..9).map(|_| bar(100.0)).collect();
        let trend = trend_from_closes(&bars);
        assert_eq!(trend.direction, TrendDirection::Sideways);
    }

    #[test]
    fn rising_series_is_up_with_positive_growth() {
        let closes = [90.0, 91.0, 92.0, 95.0, 98.0, 100.0, 104.0, 108.0, 112.0];
        let bars: Vec<BarPayload> = closes.iter().map(|c| bar(*c)).collect();
        let trend = trend_from_closes(&bars);
        assert_eq!(trend.direction, TrendDirection::Up);
        assert!(trend.expected_growth_percent > 0.0);
        assert!(trend.confidence > 0.0 && trend.confidence <= 1.0);
    }

    #[test]
    fn too_few_bars_is_sideways_with_zero_confidence() {
        let bars = vec![bar(100.0), bar(101.0)];
        let trend = trend_from_closes(&bars);
        assert_eq!(trend.direction, TrendDirection::Sideways);
        assert_eq!(trend.confidence, 0.0);
    }
}
