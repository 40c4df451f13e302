use crate::error::{Error, Result};
use crate::fee::fee_target;
use crate::generator::GenerationResult;
use crate::params::GenerateChangeParams;

/// Check the accounting identities every successful generation must satisfy:
///
/// - `fixed_in + change_in - fixed_out - change_out == fee`
/// - `fee == ceil(size / 1000 * sats_per_kb)`
///
/// A failure here is a bug in the generator or the size model and is never
/// patched up.
pub fn validate_generation_result(
    params: &GenerateChangeParams,
    result: &GenerationResult,
) -> Result<()> {
    let funding = i128::from(params.fixed_input_satoshis()) + i128::from(result.allocated_satoshis());
    let spending = i128::from(params.fixed_output_satoshis());
    let change = i128::from(result.change_satoshis());
    let actual_fee = funding - spending - change;

    let mut problems = Vec::new();
    if actual_fee != i128::from(result.fee) {
        problems.push(format!(
            "fee {} does not match funding {funding} - spending {spending} - change {change} = {actual_fee}",
            result.fee
        ));
    }
    let required = fee_target(result.size, result.sats_per_kb);
    if result.fee != required {
        problems.push(format!(
            "fee {} is not the {required} required for {} bytes at {} sat/kb",
            result.fee, result.size, result.sats_per_kb
        ));
    }
    if actual_fee < 0 {
        problems.push(format!("negative fee {actual_fee}"));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::InternalConsistency(problems.join("; ")))
    }
}
