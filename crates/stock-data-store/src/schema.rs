/// Each statement is executed individually at pool construction — sqlite
/// (via `sqlx`) does not accept a semicolon-joined batch through a single
/// prepared statement.
pub const CREATE_TABLES: &[&str] = &[STOCK_DATA, SCAN_LOG, WATCHLIST];

const STOCK_DATA: &str = r#"
CREATE TABLE IF NOT EXISTS stock_data (
    symbol TEXT PRIMARY KEY,
    modification_time TEXT NOT NULL,

    report_date TEXT,
    piotroski_f_score INTEGER,
    altman_z_score REAL,
    roa REAL,
    debt_to_equity REAL,
    current_ratio REAL,
    market_cap_billions REAL,
    total_assets REAL,
    total_liabilities REAL,
    total_equity REAL,
    revenue REAL,
    net_income REAL,
    operating_cash_flow REAL,
    shares_outstanding REAL,
    fundamentals_updated_at TEXT,

    current_price REAL,
    strike_price REAL,
    expiry TEXT,
    days_to_expiry INTEGER,
    premium REAL,
    breakeven REAL,
    confidence REAL,
    expected_growth_percent REAL,
    strategy_name TEXT,
    exchange_symbol TEXT,
    option_price REAL,
    volume INTEGER,
    open_interest INTEGER,
    market_updated_at TEXT
);
"#;

const SCAN_LOG: &str = r#"
CREATE TABLE IF NOT EXISTS scan_log (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    symbols_scanned INTEGER NOT NULL DEFAULT 0,
    recommendations_generated INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    error_message TEXT
);
"#;

const WATCHLIST: &str = r#"
CREATE TABLE IF NOT EXISTS watchlist (
    symbol TEXT PRIMARY KEY,
    added_at TEXT NOT NULL
);
"#;
