pub mod engine;
pub mod scoring;
pub mod strategies;

pub use engine::StrategyEngine;
pub use strategies::{DividendMomentum, ShortTermPut, VolatilityCrush};
