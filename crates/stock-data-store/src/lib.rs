pub mod row;
pub mod scan_log;
pub mod schema;
pub mod store;
pub mod updates;
pub mod watchlist;

pub use store::StockDataStore;
pub use updates::MarketLayerUpdate;
