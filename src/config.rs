use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

/// Default values for configuration
const DEFAULT_ORACLE_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_ORACLE_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ORACLE_MAX_CONCURRENT: usize = 10;
const DEFAULT_ORACLE_MIN_SPACING_MS: u64 = 60;
const DEFAULT_ORACLE_CALLS_PER_MINUTE: u32 = 900;
const DEFAULT_ORACLE_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_ORACLE_RATE_LIMIT_FALLBACK_SECS: u64 = 30;
const DEFAULT_ORACLE_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ALLOCATOR_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_ORDER_NUMBER_WIDTH: usize = 8;
const DEFAULT_INVOICE_PREFIX: &str = "INV";
const DEFAULT_DEPLETION_WARNING_DAYS: i64 = 14;
const DEFAULT_SEASONAL_STOCK_THRESHOLD: i32 = 20;
const DEFAULT_VELOCITY_WINDOW_DAYS: i64 = 30;
const DEFAULT_REORDER_MIN: i64 = 10;
const DEFAULT_REORDER_MAX: i64 = 1000;
const CONFIG_DIR: &str = "config";

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}

/// Oracle gateway tuning.
#[derive(Clone, Debug, Deserialize)]
pub struct OracleConfig {
    /// Provider API key; the HTTP client refuses to construct without one.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_oracle_api_url")]
    pub api_url: String,

    #[serde(default = "default_oracle_model")]
    pub model: String,

    /// Maximum simultaneous in-flight provider calls.
    #[serde(default = "default_oracle_max_concurrent")]
    pub max_concurrent: usize,

    /// Minimum spacing between the start of consecutive calls.
    #[serde(default = "default_oracle_min_spacing_ms")]
    pub min_spacing_ms: u64,

    /// Sliding one-minute quota.
    #[serde(default = "default_oracle_calls_per_minute")]
    pub calls_per_minute: u32,

    /// Bounded attempts per logical `ask` before falling back.
    #[serde(default = "default_oracle_max_attempts")]
    pub max_attempts: u32,

    /// Retry delay when the provider rate-limits without a retry-after hint.
    #[serde(default = "default_oracle_rate_limit_fallback_secs")]
    pub rate_limit_fallback_secs: u64,

    /// Overall per-request timeout applied to the HTTP client.
    #[serde(default = "default_oracle_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_oracle_api_url(),
            model: default_oracle_model(),
            max_concurrent: default_oracle_max_concurrent(),
            min_spacing_ms: default_oracle_min_spacing_ms(),
            calls_per_minute: default_oracle_calls_per_minute(),
            max_attempts: default_oracle_max_attempts(),
            rate_limit_fallback_secs: default_oracle_rate_limit_fallback_secs(),
            request_timeout_secs: default_oracle_request_timeout_secs(),
        }
    }
}

/// Number allocator tuning.
#[derive(Clone, Debug, Deserialize)]
pub struct AllocatorConfig {
    #[serde(default = "default_allocator_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_order_number_width")]
    pub order_number_width: usize,

    #[serde(default = "default_invoice_prefix")]
    pub invoice_prefix: String,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_allocator_max_attempts(),
            order_number_width: default_order_number_width(),
            invoice_prefix: default_invoice_prefix(),
        }
    }
}

/// One in-season window for a product category. Months are 1-12 inclusive;
/// a window may wrap the year end (e.g. 11..2).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SeasonalRule {
    pub category: String,
    pub start_month: u32,
    pub end_month: u32,
}

impl SeasonalRule {
    pub fn contains_month(&self, month: u32) -> bool {
        if self.start_month <= self.end_month {
            (self.start_month..=self.end_month).contains(&month)
        } else {
            month >= self.start_month || month <= self.end_month
        }
    }
}

/// Stock intelligence tuning. The seasonal categories and month windows are
/// illustrative business configuration, not authoritative domain rules.
#[derive(Clone, Debug, Deserialize)]
pub struct StockConfig {
    /// Depletion horizon that turns a low-stock product into an alert.
    #[serde(default = "default_depletion_warning_days")]
    pub depletion_warning_days: i64,

    /// Flat threshold used for seasonal alerts, independent of the
    /// per-product critical level.
    #[serde(default = "default_seasonal_stock_threshold")]
    pub seasonal_stock_threshold: i32,

    /// Trailing window for the sales velocity computation.
    #[serde(default = "default_velocity_window_days")]
    pub velocity_window_days: i64,

    #[serde(default = "default_reorder_min")]
    pub reorder_min: i64,

    #[serde(default = "default_reorder_max")]
    pub reorder_max: i64,

    #[serde(default = "default_seasonal_rules")]
    pub seasonal_rules: Vec<SeasonalRule>,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            depletion_warning_days: default_depletion_warning_days(),
            seasonal_stock_threshold: default_seasonal_stock_threshold(),
            velocity_window_days: default_velocity_window_days(),
            reorder_min: default_reorder_min(),
            reorder_max: default_reorder_max(),
            seasonal_rules: default_seasonal_rules(),
        }
    }
}

/// Application configuration, layered defaults -> optional file -> `APP_` env.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub allocator: AllocatorConfig,

    #[serde(default)]
    pub stock: StockConfig,
}

impl AppConfig {
    /// Loads configuration from `config/default.toml` (optional) and the
    /// environment (`APP_ORACLE__MODEL=...` style overrides).
    pub fn load() -> Result<Self, ConfigurationError> {
        let settings = Config::builder()
            .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over the passed
/// level when set and non-empty.
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("opsledger_api={}", level);
    let directive = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    tracing_subscriber::registry()
        .with(EnvFilter::new(directive))
        .with(fmt::layer())
        .init();
}

fn default_oracle_api_url() -> String {
    DEFAULT_ORACLE_API_URL.to_string()
}
fn default_oracle_model() -> String {
    DEFAULT_ORACLE_MODEL.to_string()
}
fn default_oracle_max_concurrent() -> usize {
    DEFAULT_ORACLE_MAX_CONCURRENT
}
fn default_oracle_min_spacing_ms() -> u64 {
    DEFAULT_ORACLE_MIN_SPACING_MS
}
fn default_oracle_calls_per_minute() -> u32 {
    DEFAULT_ORACLE_CALLS_PER_MINUTE
}
fn default_oracle_max_attempts() -> u32 {
    DEFAULT_ORACLE_MAX_ATTEMPTS
}
fn default_oracle_rate_limit_fallback_secs() -> u64 {
    DEFAULT_ORACLE_RATE_LIMIT_FALLBACK_SECS
}
fn default_oracle_request_timeout_secs() -> u64 {
    DEFAULT_ORACLE_REQUEST_TIMEOUT_SECS
}
fn default_allocator_max_attempts() -> u32 {
    DEFAULT_ALLOCATOR_MAX_ATTEMPTS
}
fn default_order_number_width() -> usize {
    DEFAULT_ORDER_NUMBER_WIDTH
}
fn default_invoice_prefix() -> String {
    DEFAULT_INVOICE_PREFIX.to_string()
}
fn default_depletion_warning_days() -> i64 {
    DEFAULT_DEPLETION_WARNING_DAYS
}
fn default_seasonal_stock_threshold() -> i32 {
    DEFAULT_SEASONAL_STOCK_THRESHOLD
}
fn default_velocity_window_days() -> i64 {
    DEFAULT_VELOCITY_WINDOW_DAYS
}
fn default_reorder_min() -> i64 {
    DEFAULT_REORDER_MIN
}
fn default_reorder_max() -> i64 {
    DEFAULT_REORDER_MAX
}
fn default_seasonal_rules() -> Vec<SeasonalRule> {
    vec![
        SeasonalRule {
            category: "electronics".to_string(),
            start_month: 11,
            end_month: 12,
        },
        SeasonalRule {
            category: "garden".to_string(),
            start_month: 4,
            end_month: 8,
        },
        SeasonalRule {
            category: "toys".to_string(),
            start_month: 11,
            end_month: 1,
        },
    ]
}
