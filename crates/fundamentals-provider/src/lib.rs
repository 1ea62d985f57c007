pub mod csv_ingest;
pub mod http;
pub mod scoring;

pub use csv_ingest::parse_bulk_feed;
pub use http::HttpFundamentalsProvider;
pub use scoring::{altman_z_score, piotroski_f_score, FinancialSnapshot};
