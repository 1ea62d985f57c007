use crate::Symbol;
use chrono::NaiveTime;

/// Strategy-evaluation tunables (spec §6 `strategy.*`).
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub min_expiry_days: i64,
    pub max_expiry_days: i64,
    pub min_confidence: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_expiry_days: 14,
            max_expiry_days: 21,
            min_confidence: 0.5,
        }
    }
}

/// Options-discovery tunables (spec §6 `optionsDiscovery.*`).
#[derive(Debug, Clone)]
pub struct OptionsDiscoveryConfig {
    pub enabled: bool,
    pub min_open_interest: i64,
    pub min_volume: i64,
    pub sample_options_per_underlying: usize,
    pub fallback_to_watchlist: bool,
    pub max_expiry_days: i64,
}

impl Default for OptionsDiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_open_interest: 100,
            min_volume: 10,
            sample_options_per_underlying: 5,
            fallback_to_watchlist: true,
            max_expiry_days: 45,
        }
    }
}

/// Provider retry/backoff tunables (spec §6 `rateLimiting.*`).
#[derive(Debug, Clone)]
pub struct RateLimitingConfig {
    pub max_retries: u32,
    pub initial_retry_delay_seconds: u64,
    pub use_exponential_backoff: bool,
    pub attempt_timeout_seconds: u64,
    pub enable_retry_on_429: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay_seconds: 1,
            use_exponential_backoff: true,
            attempt_timeout_seconds: 60,
            enable_retry_on_429: true,
        }
    }
}

/// The flat configuration struct the core consumes (spec §6 "Configuration").
///
/// Loading this from layered sources (files, a remote key-value store) is
/// explicitly out of scope (spec §1); [`ScanConfig::from_env`] is only a
/// convenience constructor reading plain environment variables, mirroring
/// how every adapter crate in this workspace reads its own settings.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub scan_time: NaiveTime,
    pub watchlist: Vec<Symbol>,
    pub strategy: StrategyConfig,
    pub options_discovery: OptionsDiscoveryConfig,
    pub rate_limiting: RateLimitingConfig,
    pub retention_days: i64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_time: NaiveTime::from_hms_opt(4, 0, 0).expect("valid constant time"),
            watchlist: Vec::new(),
            strategy: StrategyConfig::default(),
            options_discovery: OptionsDiscoveryConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            retention_days: 90,
        }
    }
}

impl ScanConfig {
    /// Load from environment variables, falling back to defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let scan_time = std::env::var("SCAN_TIME")
            .ok()
            .and_then(|s| NaiveTime::parse_from_str(&s, "%H:%M").ok())
            .unwrap_or(defaults.scan_time);

        let watchlist = std::env::var("SCAN_WATCHLIST")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|sym| sym.trim().to_string())
                    .filter(|sym| !sym.is_empty())
                    .filter_map(|sym| Symbol::new(sym).ok())
                    .collect()
            })
            .unwrap_or(defaults.watchlist);

        Self {
            scan_time,
            watchlist,
            strategy: StrategyConfig {
                min_expiry_days: env_parse("STRATEGY_MIN_EXPIRY_DAYS", defaults.strategy.min_expiry_days),
                max_expiry_days: env_parse("STRATEGY_MAX_EXPIRY_DAYS", defaults.strategy.max_expiry_days),
                min_confidence: env_parse("STRATEGY_MIN_CONFIDENCE", defaults.strategy.min_confidence),
            },
            options_discovery: OptionsDiscoveryConfig {
                enabled: env_parse("OPTIONS_DISCOVERY_ENABLED", defaults.options_discovery.enabled),
                min_open_interest: env_parse(
                    "OPTIONS_DISCOVERY_MIN_OPEN_INTEREST",
                    defaults.options_discovery.min_open_interest,
                ),
                min_volume: env_parse("OPTIONS_DISCOVERY_MIN_VOLUME", defaults.options_discovery.min_volume),
                sample_options_per_underlying: env_parse(
                    "OPTIONS_DISCOVERY_SAMPLE_PER_UNDERLYING",
                    defaults.options_discovery.sample_options_per_underlying,
                ),
                fallback_to_watchlist: env_parse(
                    "OPTIONS_DISCOVERY_FALLBACK_TO_WATCHLIST",
                    defaults.options_discovery.fallback_to_watchlist,
                ),
                max_expiry_days: env_parse(
                    "OPTIONS_DISCOVERY_MAX_EXPIRY_DAYS",
                    defaults.options_discovery.max_expiry_days,
                ),
            },
            rate_limiting: RateLimitingConfig {
                max_retries: env_parse("RATE_LIMIT_MAX_RETRIES", defaults.rate_limiting.max_retries),
                initial_retry_delay_seconds: env_parse(
                    "RATE_LIMIT_INITIAL_RETRY_DELAY_SECONDS",
                    defaults.rate_limiting.initial_retry_delay_seconds,
                ),
                use_exponential_backoff: env_parse(
                    "RATE_LIMIT_USE_EXPONENTIAL_BACKOFF",
                    defaults.rate_limiting.use_exponential_backoff,
                ),
                attempt_timeout_seconds: env_parse(
                    "RATE_LIMIT_ATTEMPT_TIMEOUT_SECONDS",
                    defaults.rate_limiting.attempt_timeout_seconds,
                ),
                enable_retry_on_429: env_parse(
                    "RATE_LIMIT_ENABLE_RETRY_ON_429",
                    defaults.rate_limiting.enable_retry_on_429,
                ),
            },
            retention_days: env_parse("RETENTION_DAYS", defaults.retention_days),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.scan_time, NaiveTime::from_hms_opt(4, 0, 0).unwrap());
        assert_eq!(cfg.strategy.min_expiry_days, 14);
        assert_eq!(cfg.strategy.max_expiry_days, 21);
        assert_eq!(cfg.retention_days, 90);
        assert_eq!(cfg.rate_limiting.max_retries, 3);
    }
}
