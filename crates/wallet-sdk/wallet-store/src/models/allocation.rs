use diesel::prelude::*;

use crate::schema::change_allocations;

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = change_allocations)]
pub struct NewAllocationRow {
    pub output_id: i64,
    pub run_id: i64,
}
