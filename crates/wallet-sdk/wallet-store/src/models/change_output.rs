use diesel::prelude::*;

use crate::schema::change_outputs;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = change_outputs)]
pub struct ChangeOutputRow {
    pub output_id: i64,
    pub txid: Vec<u8>,
    pub vout: i32,
    pub satoshis: i64,
    pub locking_script: Vec<u8>,
    pub spent: i32,
    pub spending_txid: Option<Vec<u8>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = change_outputs)]
pub struct NewChangeOutputRow {
    pub txid: Vec<u8>,
    pub vout: i32,
    pub satoshis: i64,
    pub locking_script: Vec<u8>,
}
