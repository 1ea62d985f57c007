use crate::row::StockDataRow;
use crate::updates::MarketLayerUpdate;
use crate::{schema, watchlist, scan_log};
use chrono::{Duration, Utc};
use scan_core::{Fundamentals, ScanError, ScanLog, StockData, Symbol};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, Transaction};

const SELECT_COLUMNS: &str = "symbol, modification_time, report_date, piotroski_f_score, \
    altman_z_score, roa, debt_to_equity, current_ratio, market_cap_billions, total_assets, \
    total_liabilities, total_equity, revenue, net_income, operating_cash_flow, \
    shares_outstanding, fundamentals_updated_at, current_price, strike_price, expiry, \
    days_to_expiry, premium, breakeven, confidence, expected_growth_percent, strategy_name, \
    exchange_symbol, option_price, volume, open_interest, market_updated_at";

const UPSERT_SQL: &str = r#"
INSERT INTO stock_data (
    symbol, modification_time, report_date, piotroski_f_score, altman_z_score, roa,
    debt_to_equity, current_ratio, market_cap_billions, total_assets, total_liabilities,
    total_equity, revenue, net_income, operating_cash_flow, shares_outstanding,
    fundamentals_updated_at, current_price, strike_price, expiry, days_to_expiry, premium,
    breakeven, confidence, expected_growth_percent, strategy_name, exchange_symbol,
    option_price, volume, open_interest, market_updated_at
) VALUES (
    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
)
ON CONFLICT(symbol) DO UPDATE SET
    modification_time = excluded.modification_time,
    report_date = excluded.report_date,
    piotroski_f_score = excluded.piotroski_f_score,
    altman_z_score = excluded.altman_z_score,
    roa = excluded.roa,
    debt_to_equity = excluded.debt_to_equity,
    current_ratio = excluded.current_ratio,
    market_cap_billions = excluded.market_cap_billions,
    total_assets = excluded.total_assets,
    total_liabilities = excluded.total_liabilities,
    total_equity = excluded.total_equity,
    revenue = excluded.revenue,
    net_income = excluded.net_income,
    operating_cash_flow = excluded.operating_cash_flow,
    shares_outstanding = excluded.shares_outstanding,
    fundamentals_updated_at = excluded.fundamentals_updated_at,
    current_price = excluded.current_price,
    strike_price = excluded.strike_price,
    expiry = excluded.expiry,
    days_to_expiry = excluded.days_to_expiry,
    premium = excluded.premium,
    breakeven = excluded.breakeven,
    confidence = excluded.confidence,
    expected_growth_percent = excluded.expected_growth_percent,
    strategy_name = excluded.strategy_name,
    exchange_symbol = excluded.exchange_symbol,
    option_price = excluded.option_price,
    volume = excluded.volume,
    open_interest = excluded.open_interest,
    market_updated_at = excluded.market_updated_at
"#;

fn store_err(e: sqlx::Error) -> ScanError {
    ScanError::StoreError(e.to_string())
}

/// Single-record-per-symbol persistent store (spec §2 C1, §4.3). Backed by
/// a SQLite pool via `sqlx`, matching the teacher codebase's embedded-file
/// persistence for adjacent engines (no external migration runner — table
/// creation is `CREATE TABLE IF NOT EXISTS` at pool construction).
pub struct StockDataStore {
    pool: SqlitePool,
}

impl StockDataStore {
    /// Open (creating if needed) a SQLite database at `database_url`
    /// (e.g. `sqlite://scan.db` or `sqlite::memory:`) and ensure the
    /// schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, ScanError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(store_err)?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), ScanError> {
        for statement in schema::CREATE_TABLES {
            sqlx::query(statement).execute(&self.pool).await.map_err(store_err)?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn get_by_symbol(&self, symbol: &Symbol) -> Result<Option<StockData>, ScanError> {
        let row: Option<StockDataRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM stock_data WHERE symbol = ?"
        ))
        .bind(symbol.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(StockDataRow::into_stock_data).transpose()
    }

    pub async fn get_all(&self) -> Result<Vec<StockData>, ScanError> {
        let rows: Vec<StockDataRow> =
            sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM stock_data"))
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;

        rows.into_iter().map(StockDataRow::into_stock_data).collect()
    }

    /// Rows whose latest fundamentals have `piotroski_f_score >= min_f_score`
    /// (spec §4.3 `getHealthySymbols`).
    pub async fn get_healthy_symbols(&self, min_f_score: u8) -> Result<Vec<StockData>, ScanError> {
        let rows: Vec<StockDataRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM stock_data WHERE piotroski_f_score >= ?"
        ))
        .bind(i64::from(min_f_score))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(StockDataRow::into_stock_data).collect()
    }

    /// Rows with `confidence` present (spec §4.3 `getWithMarketData`).
    pub async fn get_with_market_data(&self) -> Result<Vec<StockData>, ScanError> {
        let rows: Vec<StockDataRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM stock_data WHERE confidence IS NOT NULL"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(StockDataRow::into_stock_data).collect()
    }

    async fn fetch_row_tx(
        tx: &mut Transaction<'_, Sqlite>,
        symbol: &Symbol,
    ) -> Result<Option<StockDataRow>, ScanError> {
        sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM stock_data WHERE symbol = ?"))
            .bind(symbol.as_str())
            .fetch_optional(&mut **tx)
            .await
            .map_err(store_err)
    }

    async fn upsert_row_tx(
        tx: &mut Transaction<'_, Sqlite>,
        data: &StockData,
    ) -> Result<(), ScanError> {
        sqlx::query(UPSERT_SQL)
            .bind(data.symbol.as_str())
            .bind(data.modification_time)
            .bind(data.report_date)
            .bind(data.piotroski_f_score.map(i64::from))
            .bind(data.altman_z_score)
            .bind(data.roa)
            .bind(data.debt_to_equity)
            .bind(data.current_ratio)
            .bind(data.market_cap_billions)
            .bind(data.total_assets)
            .bind(data.total_liabilities)
            .bind(data.total_equity)
            .bind(data.revenue)
            .bind(data.net_income)
            .bind(data.operating_cash_flow)
            .bind(data.shares_outstanding)
            .bind(data.fundamentals_updated_at)
            .bind(data.current_price)
            .bind(data.strike_price)
            .bind(data.expiry)
            .bind(data.days_to_expiry)
            .bind(data.premium)
            .bind(data.breakeven)
            .bind(data.confidence)
            .bind(data.expected_growth_percent)
            .bind(&data.strategy_name)
            .bind(&data.exchange_symbol)
            .bind(data.option_price)
            .bind(data.volume)
            .bind(data.open_interest)
            .bind(data.market_updated_at)
            .execute(&mut **tx)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    /// Write only the fundamentals layer, preserving whatever market
    /// layer is already present (spec §4.3 "Merge semantics", I1-I2).
    /// Read-modify-write happens inside one transaction so a concurrent
    /// `upsert_market_layer` for the same symbol can't interleave and
    /// lose either write.
    pub async fn upsert_fundamentals_layer(
        &self,
        symbol: &Symbol,
        fundamentals: &Fundamentals,
    ) -> Result<(), ScanError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let mut data = match Self::fetch_row_tx(&mut tx, symbol).await? {
            Some(row) => row.into_stock_data()?,
            None => StockData::empty(symbol.clone(), now),
        };

        data.report_date = Some(fundamentals.report_date);
        data.piotroski_f_score = Some(fundamentals.piotroski_f_score);
        data.altman_z_score = Some(fundamentals.altman_z_score);
        data.roa = Some(fundamentals.roa);
        data.debt_to_equity = Some(fundamentals.debt_to_equity);
        data.current_ratio = Some(fundamentals.current_ratio);
        data.market_cap_billions = Some(fundamentals.market_cap_billions);
        data.total_assets = Some(fundamentals.total_assets);
        data.total_liabilities = Some(fundamentals.total_liabilities);
        data.total_equity = Some(fundamentals.total_equity);
        data.revenue = Some(fundamentals.revenue);
        data.net_income = Some(fundamentals.net_income);
        data.operating_cash_flow = Some(fundamentals.operating_cash_flow);
        data.shares_outstanding = Some(fundamentals.shares_outstanding);
        data.fundamentals_updated_at = Some(now);
        data.modification_time = max_timestamp(Some(now), data.market_updated_at);

        Self::upsert_row_tx(&mut tx, &data).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    /// Write only the market/options layer, preserving the fundamentals
    /// layer (spec §4.3 "Merge semantics", I1-I2).
    pub async fn upsert_market_layer(
        &self,
        symbol: &Symbol,
        update: &MarketLayerUpdate,
    ) -> Result<(), ScanError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let mut data = match Self::fetch_row_tx(&mut tx, symbol).await? {
            Some(row) => row.into_stock_data()?,
            None => StockData::empty(symbol.clone(), now),
        };

        data.current_price = Some(update.current_price);
        data.strike_price = Some(update.strike_price);
        data.expiry = Some(update.expiry);
        data.days_to_expiry = Some(update.days_to_expiry);
        data.premium = Some(update.premium);
        data.breakeven = Some(update.breakeven);
        data.confidence = Some(update.confidence);
        data.expected_growth_percent = Some(update.expected_growth_percent);
        data.strategy_name = Some(update.strategy_name.clone());
        data.exchange_symbol = update.exchange_symbol.clone();
        data.option_price = Some(update.option_price);
        data.volume = Some(update.volume);
        data.open_interest = Some(update.open_interest);
        data.market_updated_at = Some(now);
        data.modification_time = max_timestamp(data.fundamentals_updated_at, Some(now));

        Self::upsert_row_tx(&mut tx, &data).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    /// Equivalent to looping `upsert_fundamentals_layer`, but as a single
    /// transaction with bounded memory (spec §4.3 `bulkUpsertFundamentals`):
    /// each row is read-modified-written in turn inside one transaction
    /// rather than materializing the whole table in memory first.
    pub async fn bulk_upsert_fundamentals(
        &self,
        rows: Vec<(Symbol, Fundamentals)>,
    ) -> Result<usize, ScanError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let mut written = 0usize;

        for (symbol, fundamentals) in rows {
            let mut data = match Self::fetch_row_tx(&mut tx, &symbol).await? {
                Some(row) => row.into_stock_data()?,
                None => StockData::empty(symbol.clone(), now),
            };

            data.report_date = Some(fundamentals.report_date);
            data.piotroski_f_score = Some(fundamentals.piotroski_f_score);
            data.altman_z_score = Some(fundamentals.altman_z_score);
            data.roa = Some(fundamentals.roa);
            data.debt_to_equity = Some(fundamentals.debt_to_equity);
            data.current_ratio = Some(fundamentals.current_ratio);
            data.market_cap_billions = Some(fundamentals.market_cap_billions);
            data.total_assets = Some(fundamentals.total_assets);
            data.total_liabilities = Some(fundamentals.total_liabilities);
            data.total_equity = Some(fundamentals.total_equity);
            data.revenue = Some(fundamentals.revenue);
            data.net_income = Some(fundamentals.net_income);
            data.operating_cash_flow = Some(fundamentals.operating_cash_flow);
            data.shares_outstanding = Some(fundamentals.shares_outstanding);
            data.fundamentals_updated_at = Some(now);
            data.modification_time = max_timestamp(Some(now), data.market_updated_at);

            Self::upsert_row_tx(&mut tx, &data).await?;
            written += 1;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(written)
    }

    /// Delete records whose `modification_time` is older than `max_age`
    /// (spec §3 I4, §4.3 "Retention").
    pub async fn delete_stale_records(&self, max_age: Duration) -> Result<u64, ScanError> {
        let cutoff = Utc::now() - max_age;
        let result = sqlx::query("DELETE FROM stock_data WHERE modification_time < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    pub async fn get_watchlist(&self) -> Result<Vec<Symbol>, ScanError> {
        watchlist::get_watchlist(&self.pool).await
    }

    pub async fn set_watchlist(&self, symbols: &[Symbol]) -> Result<(), ScanError> {
        watchlist::set_watchlist(&self.pool, symbols).await
    }

    pub async fn insert_scan_log(&self, log: &ScanLog) -> Result<(), ScanError> {
        scan_log::insert(&self.pool, log).await
    }

    pub async fn update_scan_log(&self, log: &ScanLog) -> Result<(), ScanError> {
        scan_log::update(&self.pool, log).await
    }

    pub async fn get_scan_log(&self, id: uuid::Uuid) -> Result<Option<ScanLog>, ScanError> {
        scan_log::get(&self.pool, id).await
    }
}

fn max_timestamp(
    a: Option<chrono::DateTime<Utc>>,
    b: Option<chrono::DateTime<Utc>>,
) -> chrono::DateTime<Utc> {
    match (a, b) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    async fn memory_store() -> StockDataStore {
        StockDataStore::connect("sqlite::memory:").await.unwrap()
    }

    fn fundamentals(score: u8) -> Fundamentals {
        Fundamentals {
            report_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            piotroski_f_score: score,
            altman_z_score: 3.2,
            roa: 0.1,
            debt_to_equity: 0.5,
            current_ratio: 1.8,
            market_cap_billions: 12.0,
            total_assets: 1_000.0,
            total_liabilities: 400.0,
            total_equity: 600.0,
            revenue: 2_000.0,
            net_income: 150.0,
            operating_cash_flow: 200.0,
            shares_outstanding: 100.0,
        }
    }

    fn market_update(confidence: f64) -> MarketLayerUpdate {
        MarketLayerUpdate {
            current_price: 100.0,
            strike_price: 95.0,
            expiry: NaiveDate::from_ymd_opt(2026, 4, 15).unwrap(),
            days_to_expiry: 18,
            premium: 1.5,
            breakeven: 93.5,
            confidence,
            expected_growth_percent: 4.0,
            strategy_name: "ShortTermPut".to_string(),
            exchange_symbol: Some("AAA".to_string()),
            option_price: 1.5,
            volume: 200,
            open_interest: 800,
        }
    }

    #[tokio::test]
    async fn upserts_preserve_the_other_layer() {
        let store = memory_store().await;
        let symbol = Symbol::new("AAA").unwrap();

        store.upsert_fundamentals_layer(&symbol, &fundamentals(8)).await.unwrap();
        store.upsert_market_layer(&symbol, &market_update(0.7)).await.unwrap();

        let row = store.get_by_symbol(&symbol).await.unwrap().unwrap();
        assert_eq!(row.piotroski_f_score, Some(8));
        assert_eq!(row.confidence, Some(0.7));

        // A second fundamentals write must not clobber the market layer.
        store.upsert_fundamentals_layer(&symbol, &fundamentals(6)).await.unwrap();
        let row = store.get_by_symbol(&symbol).await.unwrap().unwrap();
        assert_eq!(row.piotroski_f_score, Some(6));
        assert_eq!(row.confidence, Some(0.7));
        assert_eq!(row.strike_price, Some(95.0));
    }

    #[tokio::test]
    async fn modification_time_is_max_of_both_layers() {
        let store = memory_store().await;
        let symbol = Symbol::new("AAA").unwrap();

        store.upsert_fundamentals_layer(&symbol, &fundamentals(8)).await.unwrap();
        let after_fundamentals = store.get_by_symbol(&symbol).await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.upsert_market_layer(&symbol, &market_update(0.7)).await.unwrap();
        let after_market = store.get_by_symbol(&symbol).await.unwrap().unwrap();

        assert!(after_market.modification_time > after_fundamentals.modification_time);
        assert_eq!(after_market.modification_time, after_market.market_updated_at.unwrap());
    }

    #[tokio::test]
    async fn healthy_symbols_filters_by_f_score() {
        let store = memory_store().await;
        store
            .upsert_fundamentals_layer(&Symbol::new("AAA").unwrap(), &fundamentals(8))
            .await
            .unwrap();
        store
            .upsert_fundamentals_layer(&Symbol::new("BBB").unwrap(), &fundamentals(3))
            .await
            .unwrap();

        let healthy = store.get_healthy_symbols(7).await.unwrap();
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].symbol.as_str(), "AAA");
    }

    #[tokio::test]
    async fn retention_deletes_only_stale_rows() {
        let store = memory_store().await;
        let stale_symbol = Symbol::new("OLD").unwrap();
        let fresh_symbol = Symbol::new("NEW").unwrap();

        store.upsert_fundamentals_layer(&stale_symbol, &fundamentals(8)).await.unwrap();
        store.upsert_fundamentals_layer(&fresh_symbol, &fundamentals(8)).await.unwrap();

        sqlx::query("UPDATE stock_data SET modification_time = ? WHERE symbol = ?")
            .bind(Utc::now() - Duration::days(91))
            .bind("OLD")
            .execute(&store.pool)
            .await
            .unwrap();

        let deleted = store.delete_stale_records(Duration::days(90)).await.unwrap();
        assert_eq!(deleted, 1);

        assert!(store.get_by_symbol(&stale_symbol).await.unwrap().is_none());
        assert!(store.get_by_symbol(&fresh_symbol).await.unwrap().is_some());
    }
}
