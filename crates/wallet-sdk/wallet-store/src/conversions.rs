use wallet_sdk::ChangeInput;

use crate::error::StoreError;
use crate::models::{ChangeOutputRow, GenerationRunRow, NewChangeOutputRow};
use crate::store::{GenerationRun, NewChangeOutput, RunStatus, StoredChangeOutput};

pub fn vec_to_array32(v: &[u8], field: &str) -> std::result::Result<[u8; 32], StoreError> {
    v.try_into().map_err(|_| {
        StoreError::InvalidData(format!("{field}: expected 32 bytes, got {}", v.len()))
    })
}

pub fn sats_to_i64(sats: u64) -> std::result::Result<i64, StoreError> {
    i64::try_from(sats)
        .map_err(|_| StoreError::InvalidData(format!("satoshi amount {sats} out of range")))
}

pub fn sats_from_i64(sats: i64) -> std::result::Result<u64, StoreError> {
    u64::try_from(sats).map_err(|_| StoreError::InvalidData(format!("negative satoshis: {sats}")))
}

/// Clamp a selection bound into the column range. Amounts above `i64::MAX`
/// can never be matched anyway.
pub fn bound_to_i64(sats: u64) -> i64 {
    i64::try_from(sats).unwrap_or(i64::MAX)
}

pub fn new_change_output_row(
    output: &NewChangeOutput,
) -> std::result::Result<NewChangeOutputRow, StoreError> {
    let vout = i32::try_from(output.vout)
        .map_err(|_| StoreError::InvalidData(format!("vout {} out of range", output.vout)))?;
    Ok(NewChangeOutputRow {
        txid: output.txid.to_vec(),
        vout,
        satoshis: sats_to_i64(output.satoshis)?,
        locking_script: output.locking_script.clone(),
    })
}

pub fn change_input_from_pair(
    (output_id, satoshis): (i64, i64),
) -> std::result::Result<ChangeInput, StoreError> {
    Ok(ChangeInput {
        output_id,
        satoshis: sats_from_i64(satoshis)?,
    })
}

impl TryFrom<&ChangeOutputRow> for StoredChangeOutput {
    type Error = StoreError;

    fn try_from(row: &ChangeOutputRow) -> std::result::Result<Self, Self::Error> {
        Ok(StoredChangeOutput {
            output_id: row.output_id,
            txid: vec_to_array32(&row.txid, "txid")?,
            vout: u32::try_from(row.vout)
                .map_err(|_| StoreError::InvalidData(format!("negative vout: {}", row.vout)))?,
            satoshis: sats_from_i64(row.satoshis)?,
            locking_script: row.locking_script.clone(),
            spent: row.spent != 0,
            spending_txid: row
                .spending_txid
                .as_deref()
                .map(|t| vec_to_array32(t, "spending_txid"))
                .transpose()?,
            created_at: row.created_at.clone(),
            updated_at: row.updated_at.clone(),
        })
    }
}

impl TryFrom<&GenerationRunRow> for GenerationRun {
    type Error = StoreError;

    fn try_from(row: &GenerationRunRow) -> std::result::Result<Self, Self::Error> {
        Ok(GenerationRun {
            run_id: row.run_id,
            status: RunStatus::from_i32(row.status)?,
            spending_txid: row
                .spending_txid
                .as_deref()
                .map(|t| vec_to_array32(t, "spending_txid"))
                .transpose()?,
            created_at: row.created_at.clone(),
            updated_at: row.updated_at.clone(),
        })
    }
}
