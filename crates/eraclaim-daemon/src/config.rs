//! Configuration file management.
//!
//! Read from `$ERACLAIM_DATA_DIR/config.toml`. Every field has a default,
//! so a missing file or section yields a working configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use eraclaim_claim::ClaimConfig;
use eraclaim_tx::SessionConfig;
use eraclaim_types::{AccountId, HISTORY_DEPTH};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "ERACLAIM_DATA_DIR";

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub claim: ClaimSettings,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Ledger backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Chain snapshot (JSON). Empty = `$data_dir/chain.json`.
    #[serde(default)]
    pub snapshot_path: String,
    /// Trailing eras whose rewards stay claimable.
    #[serde(default = "default_history_depth")]
    pub history_depth: u32,
}

/// Accounts the daemon reports on and signs for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// Stash addresses to aggregate.
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Default signing account. Empty = none; requests must name one.
    #[serde(default)]
    pub signer: String,
}

/// Claim loop tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSettings {
    /// Seconds to wait for the first status of a submission.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Pause after the inter-batch header, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Payouts per batch. Unset = derived from the runtime constant.
    #[serde(default)]
    pub max_batch_size: Option<usize>,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log file path. Empty = stderr.
    #[serde(default)]
    pub log_file: String,
}

fn default_history_depth() -> u32 {
    HISTORY_DEPTH
}

fn default_grace_period_secs() -> u64 {
    60
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            snapshot_path: String::new(),
            history_depth: default_history_depth(),
        }
    }
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            max_batch_size: None,
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: String::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the chain snapshot path.
    pub fn snapshot_path(&self) -> PathBuf {
        if self.ledger.snapshot_path.is_empty() {
            self.data_dir().join("chain.json")
        } else {
            PathBuf::from(&self.ledger.snapshot_path)
        }
    }

    /// Configured stash addresses.
    pub fn addresses(&self) -> anyhow::Result<Vec<AccountId>> {
        self.accounts
            .addresses
            .iter()
            .map(|a| AccountId::from_str(a).map_err(anyhow::Error::from))
            .collect()
    }

    /// Configured default signer, if any.
    pub fn signer(&self) -> Option<AccountId> {
        AccountId::from_str(&self.accounts.signer).ok()
    }

    /// Session tunables.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            grace_period: Duration::from_secs(self.claim.grace_period_secs),
        }
    }

    /// Claim loop tunables.
    pub fn claim_config(&self) -> ClaimConfig {
        ClaimConfig {
            session: self.session_config(),
            settle_delay: Duration::from_millis(self.claim.settle_delay_ms),
            max_batch_size: self.claim.max_batch_size,
        }
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Eraclaim")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".eraclaim")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/eraclaim"))
}
