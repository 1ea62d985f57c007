use crate::scoring::{altman_z_score, piotroski_f_score, FinancialSnapshot};
use chrono::NaiveDate;
use scan_core::{Fundamentals, ScanError, Symbol};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

/// One row of the out-of-band bulk feed (spec §3 "bulk CSV ingest path",
/// invoked by a separate processor outside this scan pipeline). A feed
/// may carry several quarters for the same symbol; rows are grouped and
/// the two most recent per symbol are used for the year-over-year
/// F-Score comparison, exactly like [`crate::HttpFundamentalsProvider`].
#[derive(Debug, Deserialize)]
struct FundamentalsRow {
    symbol: String,
    report_date: NaiveDate,
    total_assets: f64,
    total_liabilities: f64,
    total_equity: f64,
    revenue: f64,
    net_income: f64,
    operating_cash_flow: f64,
    current_assets: f64,
    current_liabilities: f64,
    shares_outstanding: f64,
    market_cap: f64,
    gross_profit: f64,
    long_term_debt: f64,
}

impl From<&FundamentalsRow> for FinancialSnapshot {
    fn from(r: &FundamentalsRow) -> Self {
        FinancialSnapshot {
            total_assets: r.total_assets,
            total_liabilities: r.total_liabilities,
            total_equity: r.total_equity,
            revenue: r.revenue,
            net_income: r.net_income,
            operating_cash_flow: r.operating_cash_flow,
            current_assets: r.current_assets,
            current_liabilities: r.current_liabilities,
            shares_outstanding: r.shares_outstanding,
            market_cap: r.market_cap,
            gross_profit: r.gross_profit,
            long_term_debt: r.long_term_debt,
        }
    }
}

/// Parse a bulk fundamentals CSV feed into `(Symbol, Fundamentals)` pairs
/// ready for `StockDataStore::bulk_upsert_fundamentals`. Rows with an
/// invalid symbol are skipped rather than aborting the whole ingest; the
/// skip count is logged, matching the scan loop's per-symbol isolation
/// policy (spec §7).
pub fn parse_bulk_feed<R: Read>(reader: R) -> Result<Vec<(Symbol, Fundamentals)>, ScanError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut by_symbol: HashMap<String, Vec<FundamentalsRow>> = HashMap::new();

    for record in rdr.deserialize::<FundamentalsRow>() {
        let row = record.map_err(|e| ScanError::DataValidationError(e.to_string()))?;
        by_symbol.entry(row.symbol.clone()).or_default().push(row);
    }

    let mut skipped = 0usize;
    let mut out = Vec::with_capacity(by_symbol.len());

    for (raw_symbol, mut rows) in by_symbol {
        let symbol = match Symbol::new(raw_symbol) {
            Ok(s) => s,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };

        rows.sort_by(|a, b| b.report_date.cmp(&a.report_date));
        let current = &rows[0];
        let prior = rows.iter().skip(1).find(|r| {
            r.report_date.format("%m-%d").to_string() == current.report_date.format("%m-%d").to_string()
        });

        let current_snapshot = FinancialSnapshot::from(current);
        let prior_snapshot = prior.map(FinancialSnapshot::from);

        let fundamentals = Fundamentals {
            report_date: current.report_date,
            piotroski_f_score: piotroski_f_score(&current_snapshot, prior_snapshot.as_ref()),
            altman_z_score: altman_z_score(&current_snapshot),
            roa: safe_div(current.net_income, current.total_assets),
            debt_to_equity: safe_div(current.total_liabilities, current.total_equity),
            current_ratio: safe_div(current.current_assets, current.current_liabilities),
            market_cap_billions: current.market_cap / 1_000_000_000.0,
            total_assets: current.total_assets,
            total_liabilities: current.total_liabilities,
            total_equity: current.total_equity,
            revenue: current.revenue,
            net_income: current.net_income,
            operating_cash_flow: current.operating_cash_flow,
            shares_outstanding: current.shares_outstanding,
        };

        out.push((symbol, fundamentals));
    }

    if skipped > 0 {
        tracing::warn!("bulk fundamentals ingest skipped {} row group(s) with invalid symbols", skipped);
    }

    Ok(out)
}

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() > f64::EPSILON {
        numerator / denominator
    } else {
        0.0
    }
}
