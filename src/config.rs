use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use wallet_sdk::{FeeModel, GenerateChangeParams};

use crate::error::{BackendError, Result};
use crate::service::FundingRequest;

pub const CONFIG_FILE: &str = "wallet_config.json";
const DEFAULT_DATABASE_FILE: &str = "wallet.db";
const DEFAULT_SAT_PER_KB: u64 = 100;

/// Shape of the change basket the wallet tries to maintain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeBasketConfig {
    /// Number of spendable change outputs to aim for; 0 disables net count targeting.
    pub desired_utxo_count: u32,
    pub minimum_desired_utxo_value: u64,
    pub locking_script_length: usize,
    pub unlocking_script_length: usize,
}

impl Default for ChangeBasketConfig {
    fn default() -> Self {
        Self {
            desired_utxo_count: 32,
            minimum_desired_utxo_value: 1000,
            locking_script_length: 25,
            unlocking_script_length: 107,
        }
    }
}

impl ChangeBasketConfig {
    pub fn change_initial_satoshis(&self) -> u64 {
        self.minimum_desired_utxo_value.max(1)
    }

    /// A quarter of the minimum value, rounded half up, at least one satoshi.
    pub fn change_first_satoshis(&self) -> u64 {
        (self.minimum_desired_utxo_value.saturating_add(2) / 4).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    pub database_path: PathBuf,
    pub fee_model: FeeModel,
    pub change_basket: ChangeBasketConfig,
    pub no_logging: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            fee_model: FeeModel::sat_per_kb(DEFAULT_SAT_PER_KB),
            change_basket: ChangeBasketConfig::default(),
            no_logging: false,
        }
    }
}

impl BackendConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Load `path`, or fall back to defaults when it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn database_path_str(&self) -> Result<&str> {
        self.database_path.to_str().ok_or_else(|| {
            BackendError::Config(format!(
                "database path is not valid UTF-8: {}",
                self.database_path.display()
            ))
        })
    }

    /// Generator parameters for `request` under this configuration.
    pub fn generation_params(
        &self,
        request: &FundingRequest,
        target_net_count: Option<i64>,
    ) -> GenerateChangeParams {
        let basket = &self.change_basket;
        let mut params = GenerateChangeParams::new(
            request.fee_model.unwrap_or(self.fee_model),
            basket.change_initial_satoshis(),
            basket.change_first_satoshis(),
        );
        params.fixed_inputs = request.fixed_inputs.clone();
        params.fixed_outputs = request.fixed_outputs.clone();
        params.change_locking_script_length = basket.locking_script_length;
        params.change_unlocking_script_length = basket.unlocking_script_length;
        params.target_net_count = target_net_count;
        params.random_values = request.random_values.clone();
        params.no_logging = self.no_logging;
        params
    }
}
