use diesel::prelude::*;

use crate::schema::generation_runs;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = generation_runs)]
pub struct GenerationRunRow {
    pub run_id: i64,
    pub status: i32,
    pub spending_txid: Option<Vec<u8>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = generation_runs)]
pub struct NewGenerationRunRow {
    pub status: i32,
}
