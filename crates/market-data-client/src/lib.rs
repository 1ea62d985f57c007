pub mod client;
pub mod rate_limiter;

pub use client::MarketDataClient;
pub use rate_limiter::RateLimiter;
