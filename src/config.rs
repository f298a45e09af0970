//! Configuration management with validation and defaults
//!
//! Loaded from TOML, overridden by `LOTTO_*` environment variables, then
//! validated as a whole before the engine sees it.

use crate::errors::{ConfigurationError, LotteryResult};
use crate::lottery::prize::PrizePolicy;
use crate::lottery::types::{AccountId, Amount, TIER_COUNT};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Complete engine configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LotteryConfig {
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub prizes: PrizeConfig,
    #[serde(default)]
    pub draw: DrawConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Ticket sale rules
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Exact payment required per ticket
    pub ticket_price: Amount,
    /// Account allowed to run operator actions and receive the operator cut
    pub operator_account: AccountId,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            ticket_price: 100_000_000,
            operator_account: AccountId::new("operator"),
        }
    }
}

/// Prize distribution policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrizeConfig {
    pub operator_cut_bps: u16,
    pub tier_weights: [u32; TIER_COUNT],
    /// Also require imported tier counts to equal the locally tallied counts
    pub verify_tier_statistics: bool,
}

impl Default for PrizeConfig {
    fn default() -> Self {
        let policy = PrizePolicy::default();
        Self {
            operator_cut_bps: policy.operator_cut_bps,
            tier_weights: policy.tier_weights,
            verify_tier_statistics: false,
        }
    }
}

impl PrizeConfig {
    pub fn policy(&self) -> PrizePolicy {
        PrizePolicy {
            operator_cut_bps: self.operator_cut_bps,
            tier_weights: self.tier_weights,
        }
    }
}

/// Random draw settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DrawConfig {
    /// Source requests allowed per `complete_draw` call before giving up
    pub max_attempts: u32,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self { max_attempts: 21 }
    }
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub enabled: bool,
    pub data_directory: String,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_directory: "./DB/lottery_data".to_string(),
            clear_on_start: false,
        }
    }
}

/// Monitoring and logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    pub log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            log_level: LogLevel::Info,
        }
    }
}

impl LotteryConfig {
    /// In-memory configuration with a small ticket price, for tests and demos
    pub fn testing() -> Self {
        Self {
            rules: RulesConfig {
                ticket_price: 1_000,
                ..Default::default()
            },
            storage: StorageConfig {
                enabled: false,
                clear_on_start: true,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.rules.ticket_price == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "rules.ticket_price".to_string(),
                value: "0".to_string(),
                reason: "ticket price must be > 0".to_string(),
            });
        }

        if self.rules.operator_account.as_str().trim().is_empty() {
            return Err(ConfigurationError::MissingRequired("rules.operator_account".to_string()));
        }

        self.prizes.policy().validate()?;

        if self.draw.max_attempts == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "draw.max_attempts".to_string(),
                value: "0".to_string(),
                reason: "at least one attempt is needed".to_string(),
            });
        }

        if self.storage.enabled && self.storage.data_directory.is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.data_directory".to_string()));
        }

        Ok(())
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> LotteryResult<LotteryConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => LotteryConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> LotteryResult<LotteryConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut LotteryConfig) -> LotteryResult<()> {
        if let Ok(price) = env::var("LOTTO_TICKET_PRICE") {
            config.rules.ticket_price = price.parse().map_err(|_| ConfigurationError::InvalidValue {
                field: "LOTTO_TICKET_PRICE".to_string(),
                value: price,
                reason: "Invalid amount".to_string(),
            })?;
        }

        if let Ok(operator) = env::var("LOTTO_OPERATOR_ACCOUNT") {
            config.rules.operator_account = AccountId::new(operator);
        }

        if let Ok(bps) = env::var("LOTTO_OPERATOR_CUT_BPS") {
            config.prizes.operator_cut_bps = bps.parse().map_err(|_| ConfigurationError::InvalidValue {
                field: "LOTTO_OPERATOR_CUT_BPS".to_string(),
                value: bps,
                reason: "Invalid basis points".to_string(),
            })?;
        }

        if let Ok(data_dir) = env::var("LOTTO_DATA_DIR") {
            config.storage.data_directory = data_dir;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &LotteryConfig, path: &str) -> LotteryResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}
