//! Shared fixtures for generator, store and service tests.

use crate::allocation::{ChangeInput, MemoryChangePool};
use crate::fee::FeeModel;
use crate::params::{FixedOutput, GenerateChangeParams};

/// The canonical 11-candidate change pool used across the test suites.
pub const REFERENCE_POOL: [(i64, u64); 11] = [
    (15005, 6323),
    (15011, 1004),
    (15013, 1000),
    (15017, 1000),
    (15023, 1000),
    (15027, 1041),
    (15034, 1000),
    (15101, 16_151),
    (15103, 1000),
    (15104, 1000),
    (15106, 1000),
];

/// Random values replayed by the deterministic scenarios.
pub const REFERENCE_RANDOM_VALUES: [f64; 5] = [0.3, 0.7, 0.1, 0.9, 0.5];

pub fn change_input(output_id: i64, satoshis: u64) -> ChangeInput {
    ChangeInput {
        output_id,
        satoshis,
    }
}

pub fn reference_candidates() -> Vec<ChangeInput> {
    REFERENCE_POOL
        .iter()
        .map(|&(id, sats)| change_input(id, sats))
        .collect()
}

pub fn reference_pool() -> MemoryChangePool {
    MemoryChangePool::new(reference_candidates())
}

/// A 1.7 MB data-carrier output plus a 2-satoshi P2PKH output at 2 sat/kb.
pub fn large_output_params() -> GenerateChangeParams {
    let mut params = GenerateChangeParams::new(FeeModel::sat_per_kb(2), 1000, 285);
    params.fixed_outputs = vec![
        FixedOutput {
            satoshis: 1234,
            locking_script_length: 1_739_091,
        },
        FixedOutput {
            satoshis: 2,
            locking_script_length: 25,
        },
    ];
    params.random_values = Some(REFERENCE_RANDOM_VALUES.to_vec());
    params.no_logging = true;
    params
}
