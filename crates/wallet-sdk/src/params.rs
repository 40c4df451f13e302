use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fee::FeeModel;

/// Largest `targetNetCount` a run accepts; every unit seeds one change output.
pub const MAX_TARGET_NET_COUNT: i64 = 10_000;

/// An input already chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedInput {
    pub satoshis: u64,
    pub unlocking_script_length: usize,
}

/// An output already chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedOutput {
    pub satoshis: u64,
    pub locking_script_length: usize,
}

/// A new change output synthesized by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOutput {
    pub satoshis: u64,
    pub locking_script_length: usize,
}

/// Everything the change generator needs for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateChangeParams {
    pub fee_model: FeeModel,
    #[serde(default)]
    pub fixed_inputs: Vec<FixedInput>,
    #[serde(default)]
    pub fixed_outputs: Vec<FixedOutput>,
    /// Value of every change output after the first one when first created.
    pub change_initial_satoshis: u64,
    /// Value of the first change output when first created.
    pub change_first_satoshis: u64,
    pub change_locking_script_length: usize,
    pub change_unlocking_script_length: usize,
    /// Desired number of new change outputs minus consumed change inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_net_count: Option<i64>,
    /// Replayable random values in `[0, 1)`; system randomness when absent or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_values: Option<Vec<f64>>,
    #[serde(default)]
    pub no_logging: bool,
}

impl GenerateChangeParams {
    /// Parameters with no fixed inputs or outputs and standard P2PKH change geometry.
    pub fn new(fee_model: FeeModel, change_initial_satoshis: u64, change_first_satoshis: u64) -> Self {
        Self {
            fee_model,
            fixed_inputs: Vec::new(),
            fixed_outputs: Vec::new(),
            change_initial_satoshis,
            change_first_satoshis,
            change_locking_script_length: 25,
            change_unlocking_script_length: 107,
            target_net_count: None,
            random_values: None,
            no_logging: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.change_initial_satoshis == 0 {
            return Err(Error::invalid(
                "changeInitialSatoshis",
                "must be greater than zero",
            ));
        }
        if self.change_first_satoshis == 0 {
            return Err(Error::invalid(
                "changeFirstSatoshis",
                "must be greater than zero",
            ));
        }
        if let Some(target) = self.target_net_count
            && target > MAX_TARGET_NET_COUNT
        {
            return Err(Error::invalid(
                "targetNetCount",
                format!("{target} exceeds {MAX_TARGET_NET_COUNT}"),
            ));
        }
        if let Some(values) = &self.random_values
            && let Some(bad) = values
                .iter()
                .find(|v| !v.is_finite() || **v < 0.0 || **v >= 1.0)
        {
            return Err(Error::invalid(
                "randomValues",
                format!("{bad} is outside [0, 1)"),
            ));
        }

        let total_in = checked_total(self.fixed_inputs.iter().map(|i| i.satoshis));
        let total_out = checked_total(self.fixed_outputs.iter().map(|o| o.satoshis));
        if total_in.is_none() {
            return Err(Error::invalid("fixedInputs", "satoshi total overflows"));
        }
        if total_out.is_none() {
            return Err(Error::invalid("fixedOutputs", "satoshi total overflows"));
        }
        Ok(())
    }

    pub fn fixed_input_satoshis(&self) -> u64 {
        self.fixed_inputs.iter().map(|i| i.satoshis).sum()
    }

    pub fn fixed_output_satoshis(&self) -> u64 {
        self.fixed_outputs.iter().map(|o| o.satoshis).sum()
    }
}

fn checked_total(mut amounts: impl Iterator<Item = u64>) -> Option<i64> {
    amounts
        .try_fold(0u64, |acc, v| acc.checked_add(v))
        .and_then(|sum| i64::try_from(sum).ok())
}
