//! Settings Provider: typed platform configuration.
//!
//! Loaded once at boot from the environment (via `dotenvy` + `std::env`, the
//! same way the rest of this codebase loads configuration). `Settings` is
//! never mutated at runtime and is never a field on [`crate::domains::auction::models::Job`]
//! or any other entity — callers always reach it through the kernel, so a
//! lifecycle can't accidentally pin a value it read at an earlier step.

use std::env;

/// Platform-wide tunables for the auction lifecycle.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Hours an outbound job's bidding window stays open by default.
    pub default_bidding_window_hours: i64,
    /// Hours a return-leg job's bidding window stays open.
    pub return_bidding_window_hours: i64,
    /// Minutes an operator has to accept or decline an offered bid.
    pub acceptance_window_minutes: i64,
    /// Minimum bid as a percentage of the customer price.
    pub min_bid_percent: u32,
    /// Maximum bid as a percentage of the customer price.
    pub max_bid_percent: u32,
    /// Whether eligibility filtering requires a postcode-prefix match.
    pub enable_postcode_filtering: bool,
}

impl Settings {
    /// Load settings from the environment, falling back to the documented
    /// defaults from the platform's settings table for anything unset.
    pub fn from_env() -> Self {
        Self {
            default_bidding_window_hours: env_i64("DEFAULT_BIDDING_WINDOW_HOURS", 24),
            return_bidding_window_hours: env_i64("RETURN_BIDDING_WINDOW_HOURS", 2),
            acceptance_window_minutes: env_i64("ACCEPTANCE_WINDOW_MINUTES", 30),
            min_bid_percent: env_u32("MIN_BID_PERCENT", 50),
            max_bid_percent: env_u32("MAX_BID_PERCENT", 75),
            enable_postcode_filtering: env_bool("ENABLE_POSTCODE_FILTERING", true),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_platform_settings_table() {
        // SAFETY: test runs single-threaded within this crate's test binary shard
        // and does not touch these keys elsewhere.
        for key in [
            "DEFAULT_BIDDING_WINDOW_HOURS",
            "RETURN_BIDDING_WINDOW_HOURS",
            "ACCEPTANCE_WINDOW_MINUTES",
            "MIN_BID_PERCENT",
            "MAX_BID_PERCENT",
            "ENABLE_POSTCODE_FILTERING",
        ] {
            env::remove_var(key);
        }

        let settings = Settings::from_env();
        assert_eq!(settings.default_bidding_window_hours, 24);
        assert_eq!(settings.return_bidding_window_hours, 2);
        assert_eq!(settings.acceptance_window_minutes, 30);
        assert_eq!(settings.min_bid_percent, 50);
        assert_eq!(settings.max_bid_percent, 75);
        assert!(settings.enable_postcode_filtering);
    }
}
