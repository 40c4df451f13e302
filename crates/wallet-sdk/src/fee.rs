use serde::{Deserialize, Serialize};

/// Bytes taken by the version and locktime fields of a legacy transaction.
const TX_ENVELOPE_SIZE: u64 = 4 + 4;

/// Bytes taken by an input's previous txid, previous index and sequence fields.
const INPUT_FIXED_SIZE: u64 = 32 + 4 + 4;

/// Bytes taken by an output's value field.
const OUTPUT_FIXED_SIZE: u64 = 8;

/// The only fee model the wallet understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeModelKind {
    #[serde(rename = "sat/kb")]
    SatPerKb,
}

/// Fee rate in satoshis per 1000 bytes of serialized transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeModel {
    pub model: FeeModelKind,
    pub value: u64,
}

impl FeeModel {
    pub fn sat_per_kb(value: u64) -> Self {
        Self {
            model: FeeModelKind::SatPerKb,
            value,
        }
    }

    /// Fee owed by a transaction of `size` bytes under this model.
    pub fn fee_for_size(&self, size: u64) -> u64 {
        fee_target(size, self.value)
    }
}

/// Byte count of a Bitcoin-style `VarInt` encoding `n`.
pub fn var_uint_size(n: u64) -> u64 {
    if n <= 0xfc {
        1
    } else if n <= 0xffff {
        3
    } else if n <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Serialized size of one input whose unlocking script is `script_len` bytes.
pub fn input_size(script_len: usize) -> u64 {
    let len = script_len as u64;
    INPUT_FIXED_SIZE + var_uint_size(len) + len
}

/// Serialized size of one output whose locking script is `script_len` bytes.
pub fn output_size(script_len: usize) -> u64 {
    let len = script_len as u64;
    var_uint_size(len) + len + OUTPUT_FIXED_SIZE
}

/// Serialized size of a non-witness transaction with the given script lengths.
///
/// Must agree byte-for-byte with the real serializer: the generator balances
/// the fee against this number, so any drift shows up as a fee mismatch.
pub fn transaction_size<I, O>(input_script_lens: I, output_script_lens: O) -> u64
where
    I: IntoIterator<Item = usize>,
    O: IntoIterator<Item = usize>,
{
    let (input_count, inputs) = input_script_lens
        .into_iter()
        .fold((0u64, 0u64), |(n, sum), len| (n + 1, sum + input_size(len)));
    let (output_count, outputs) = output_script_lens
        .into_iter()
        .fold((0u64, 0u64), |(n, sum), len| (n + 1, sum + output_size(len)));

    TX_ENVELOPE_SIZE + var_uint_size(input_count) + inputs + var_uint_size(output_count) + outputs
}

/// `ceil(size / 1000 * sats_per_kb)` in exact integer arithmetic.
pub fn fee_target(size: u64, sats_per_kb: u64) -> u64 {
    let numerator = size as u128 * sats_per_kb as u128;
    numerator.div_ceil(1000) as u64
}
