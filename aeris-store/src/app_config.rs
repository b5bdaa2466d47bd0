use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub loyalty: LoyaltyConfig,
    #[serde(default)]
    pub booking: BookingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoyaltyConfig {
    /// Length of generated coupon redemption codes
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    /// Fresh random draws before code generation is declared exhausted
    #[serde(default = "default_code_attempts")]
    pub code_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    /// "keep_coupon" or "refund_points"
    #[serde(default = "default_refund_policy")]
    pub refund_policy: String,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    5
}
fn default_code_length() -> usize {
    10
}
fn default_code_attempts() -> u32 {
    8
}
fn default_refund_policy() -> String {
    "keep_coupon".to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            code_length: default_code_length(),
            code_attempts: default_code_attempts(),
        }
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            refund_policy: default_refund_policy(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            loyalty: LoyaltyConfig::default(),
            booking: BookingConfig::default(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> aeris_core::RetryPolicy {
        aeris_core::RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `AERIS__RETRY__MAX_ATTEMPTS=10`
            .add_source(config::Environment::with_prefix("AERIS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.loyalty.code_length, 10);
        assert_eq!(cfg.booking.refund_policy, "keep_coupon");

        let policy = cfg.retry.policy();
        assert_eq!(policy.max_attempts, 5);
    }
}
