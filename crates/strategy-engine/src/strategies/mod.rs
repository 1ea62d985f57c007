mod dividend_momentum;
mod short_term_put;
mod volatility_crush;

pub use dividend_momentum::DividendMomentum;
pub use short_term_put::ShortTermPut;
pub use volatility_crush::VolatilityCrush;
