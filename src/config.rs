use once_cell::sync::Lazy;
use std::{env, time::Duration};

pub static OFFERS_ENDPOINT: Lazy<String> = Lazy::new(|| {
    env::var("OFFERS_ENDPOINT")
        .unwrap_or_else(|_| "https://www.walmart.com/orchestra/home/graphql/GetAllSellerOffers".into())
});

pub static WEBDRIVER_URL: Lazy<Option<String>> = Lazy::new(|| {
    env::var("WEBDRIVER_URL")
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
});

/// Tunables for one extraction: acquisition retry, cache lifetimes, the
/// remote-query rate window and the seller panel timers.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub acquire_max_retries: u32,
    pub acquire_retry_delay: Duration,
    pub raw_cache_ttl: Duration,
    pub seller_cache_ttl: Duration,
    pub offers_rate_limit_max: usize,
    pub offers_rate_limit_window: Duration,
    pub panel_poll_attempts: u32,
    pub panel_poll_interval: Duration,
    pub panel_debounce: Duration,
    pub panel_hard_timeout: Duration,
    pub storefront_name: String,
    pub offers_channel: String,
    pub offers_page_type: String,
    pub recent_review_days: i64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            acquire_max_retries: 5,
            acquire_retry_delay: Duration::from_millis(500),
            raw_cache_ttl: Duration::from_secs(30),
            seller_cache_ttl: Duration::from_secs(300),
            offers_rate_limit_max: 5,
            offers_rate_limit_window: Duration::from_secs(60),
            panel_poll_attempts: 20,
            panel_poll_interval: Duration::from_millis(250),
            panel_debounce: Duration::from_millis(300),
            panel_hard_timeout: Duration::from_millis(5000),
            storefront_name: "Walmart.com".into(),
            offers_channel: "WWW".into(),
            offers_page_type: "ItemPageGlobal".into(),
            recent_review_days: 30,
        }
    }
}

impl ExtractorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            acquire_max_retries: env_parse("ACQUIRE_MAX_RETRIES").unwrap_or(defaults.acquire_max_retries),
            acquire_retry_delay: env_millis("ACQUIRE_RETRY_DELAY_MS")
                .unwrap_or(defaults.acquire_retry_delay),
            raw_cache_ttl: env_secs("RAW_CACHE_TTL_SECS").unwrap_or(defaults.raw_cache_ttl),
            seller_cache_ttl: env_secs("SELLER_CACHE_TTL_SECS").unwrap_or(defaults.seller_cache_ttl),
            offers_rate_limit_max: env_parse::<usize>("OFFERS_RATE_LIMIT_MAX")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.offers_rate_limit_max),
            offers_rate_limit_window: env_secs("OFFERS_RATE_LIMIT_WINDOW_SECS")
                .unwrap_or(defaults.offers_rate_limit_window),
            panel_poll_attempts: env_parse::<u32>("PANEL_POLL_ATTEMPTS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.panel_poll_attempts),
            panel_poll_interval: env_millis("PANEL_POLL_INTERVAL_MS")
                .unwrap_or(defaults.panel_poll_interval),
            panel_debounce: env_millis("PANEL_DEBOUNCE_MS").unwrap_or(defaults.panel_debounce),
            panel_hard_timeout: env_millis("PANEL_HARD_TIMEOUT_MS")
                .unwrap_or(defaults.panel_hard_timeout),
            storefront_name: env_string("STOREFRONT_NAME").unwrap_or(defaults.storefront_name),
            offers_channel: env_string("OFFERS_CHANNEL").unwrap_or(defaults.offers_channel),
            offers_page_type: env_string("OFFERS_PAGE_TYPE").unwrap_or(defaults.offers_page_type),
            recent_review_days: env_parse::<i64>("RECENT_REVIEW_DAYS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.recent_review_days),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Zero-length timers are rejected so a bad override cannot disable a wait.
fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key)
        .filter(|v| *v > 0)
        .map(Duration::from_millis)
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).filter(|v| *v > 0).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timers() {
        let cfg = ExtractorConfig::default();
        assert_eq!(cfg.panel_hard_timeout, Duration::from_millis(5000));
        assert!(cfg.panel_debounce < cfg.panel_hard_timeout);
        assert_eq!(cfg.storefront_name, "Walmart.com");
    }

    #[test]
    fn zero_millis_override_is_ignored() {
        // SAFETY: test-local variable name, no other test reads it.
        unsafe { env::set_var("SELLERSCOPE_TEST_ZERO_MS", "0") };
        assert!(env_millis("SELLERSCOPE_TEST_ZERO_MS").is_none());
        unsafe { env::set_var("SELLERSCOPE_TEST_ZERO_MS", "250") };
        assert_eq!(
            env_millis("SELLERSCOPE_TEST_ZERO_MS"),
            Some(Duration::from_millis(250))
        );
    }
}
