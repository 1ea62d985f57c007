use crate::scoring::{altman_z_score, piotroski_f_score, FinancialSnapshot};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use scan_core::{Fundamentals, FundamentalsProvider, RateLimitingConfig, ScanError, Symbol};
use serde::Deserialize;
use std::time::Duration;

/// HTTP-backed [`FundamentalsProvider`]: fetches the two most recent
/// quarterly filings and derives the Piotroski F-Score / Altman Z-Score
/// from their year-over-year comparison (spec §4.1). Retries and 429
/// handling follow `rate_limiting` via [`HttpFundamentalsProvider::send`],
/// the same attempt/backoff/`Retry-After` loop `market-data-client::send`
/// uses for C2/C3/C5 (spec §4.6, §5/§6 "rateLimiting applies to all
/// provider calls").
pub struct HttpFundamentalsProvider {
    base_url: String,
    api_key: String,
    http: Client,
    rate_limiting: RateLimitingConfig,
}

impl HttpFundamentalsProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_config(base_url, api_key, RateLimitingConfig::default())
    }

    pub fn with_config(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        rate_limiting: RateLimitingConfig,
    ) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(rate_limiting.attempt_timeout_seconds))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http,
            rate_limiting,
        }
    }

    /// Issue `builder`, retrying transient failures and 429s per
    /// `rate_limiting` (spec §5 "Resilience"), mirroring
    /// `market_data_client::MarketDataClient::send`.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ScanError> {
        let request = builder
            .build()
            .map_err(|e| ScanError::ProviderError(e.to_string()))?;

        let mut delay = Duration::from_secs(self.rate_limiting.initial_retry_delay_seconds);

        for attempt in 0..=self.rate_limiting.max_retries {
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
                    tracing::warn!("fundamentals request failed ({}), retrying in {:?}", e, delay);
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
                    tracing::warn!("fundamentals request timed out, retrying in {:?}", delay);
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
                tracing::warn!("fundamentals 429, waiting {:?} before retry {}", retry_after, attempt + 1);
                tokio::time::sleep(retry_after).await;
                delay = Self::next_delay(delay, self.rate_limiting.use_exponential_backoff);
                continue;
            }

            if response.status().is_server_error() && attempt < self.rate_limiting.max_retries {
                tracing::warn!("fundamentals server error {}, retrying in {:?}", response.status(), delay);
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
}

#[derive(Debug, Deserialize)]
struct QuarterlyFiling {
    #[serde(rename = "reportDate")]
    report_date: NaiveDate,
    #[serde(rename = "totalAssets")]
    total_assets: f64,
    #[serde(rename = "totalLiabilities")]
    total_liabilities: f64,
    #[serde(rename = "totalEquity")]
    total_equity: f64,
    revenue: f64,
    #[serde(rename = "netIncome")]
    net_income: f64,
    #[serde(rename = "operatingCashFlow")]
    operating_cash_flow: f64,
    #[serde(rename = "currentAssets")]
    current_assets: f64,
    #[serde(rename = "currentLiabilities")]
    current_liabilities: f64,
    #[serde(rename = "sharesOutstanding")]
    shares_outstanding: f64,
    #[serde(rename = "marketCap")]
    market_cap: f64,
    #[serde(rename = "grossProfit")]
    gross_profit: f64,
    #[serde(rename = "longTermDebt")]
    long_term_debt: f64,
}

impl From<&QuarterlyFiling> for FinancialSnapshot {
    fn from(f: &QuarterlyFiling) -> Self {
        FinancialSnapshot {
            total_assets: f.total_assets,
            total_liabilities: f.total_liabilities,
            total_equity: f.total_equity,
            revenue: f.revenue,
            net_income: f.net_income,
            operating_cash_flow: f.operating_cash_flow,
            current_assets: f.current_assets,
            current_liabilities: f.current_liabilities,
            shares_outstanding: f.shares_outstanding,
            market_cap: f.market_cap,
            gross_profit: f.gross_profit,
            long_term_debt: f.long_term_debt,
        }
    }
}

fn to_fundamentals(current: &QuarterlyFiling, prior: Option<&QuarterlyFiling>) -> Fundamentals {
    let current_snapshot = FinancialSnapshot::from(current);
    let prior_snapshot = prior.map(FinancialSnapshot::from);

    Fundamentals {
        report_date: current.report_date,
        piotroski_f_score: piotroski_f_score(&current_snapshot, prior_snapshot.as_ref()),
        altman_z_score: altman_z_score(&current_snapshot),
        roa: if current.total_assets.abs() > f64::EPSILON {
            current.net_income / current.total_assets
        } else {
            0.0
        },
        debt_to_equity: if current.total_equity.abs() > f64::EPSILON {
            current.total_liabilities / current.total_equity
        } else {
            0.0
        },
        current_ratio: if current.current_liabilities.abs() > f64::EPSILON {
            current.current_assets / current.current_liabilities
        } else {
            0.0
        },
        market_cap_billions: current.market_cap / 1_000_000_000.0,
        total_assets: current.total_assets,
        total_liabilities: current.total_liabilities,
        total_equity: current.total_equity,
        revenue: current.revenue,
        net_income: current.net_income,
        operating_cash_flow: current.operating_cash_flow,
        shares_outstanding: current.shares_outstanding,
    }
}

#[async_trait]
impl FundamentalsProvider for HttpFundamentalsProvider {
    async fn get_by_symbol(&self, symbol: &Symbol) -> Result<Option<Fundamentals>, ScanError> {
        let url = format!("{}/v1/fundamentals/{}", self.base_url, symbol.as_str());
        let response = self
            .send(
                self.http
                    .get(&url)
                    .query(&[("apiKey", &self.api_key), ("limit", &"5".to_string())]),
            )
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ScanError::ProviderError(format!(
                "fundamentals request for {} failed: HTTP {}",
                symbol,
                response.status()
            )));
        }

        let mut filings: Vec<QuarterlyFiling> = response
            .json()
            .await
            .map_err(|e| ScanError::DataValidationError(e.to_string()))?;

        if filings.is_empty() {
            return Ok(None);
        }

        filings.sort_by(|a, b| b.report_date.cmp(&a.report_date));
        let current = &filings[0];
        let prior = filings.iter().find(|f| {
            (f.report_date.format("%m-%d").to_string() == current.report_date.format("%m-%d").to_string())
                && f.report_date < current.report_date
        });

        Ok(Some(to_fundamentals(current, prior)))
    }
}
