use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::{Sqlite, SqliteConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use wallet_sdk::{ChangeInput, OutputId};

use crate::conversions::{
    bound_to_i64, change_input_from_pair, new_change_output_row, sats_from_i64,
};
use crate::error::StoreError;
use crate::models::{ChangeOutputRow, GenerationRunRow, NewAllocationRow, NewGenerationRunRow};
use crate::schema::{change_allocations, change_outputs, generation_runs};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// SQL expression for SQLite's `datetime('now')`.
const DATETIME_NOW: &str = "datetime('now')";

/// How long a connection waits for another connection's write lock.
const BUSY_TIMEOUT_MS: u32 = 5_000;

pub type RunId = i64;

// --- Public types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Open = 0,
    Completed = 1,
    Aborted = 2,
}

impl RunStatus {
    pub fn from_i32(v: i32) -> std::result::Result<Self, StoreError> {
        match v {
            0 => Ok(RunStatus::Open),
            1 => Ok(RunStatus::Completed),
            2 => Ok(RunStatus::Aborted),
            other => Err(StoreError::InvalidData(format!("invalid run status: {other}"))),
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// A change output to be added to the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChangeOutput {
    pub txid: [u8; 32],
    pub vout: u32,
    pub satoshis: u64,
    pub locking_script: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChangeOutput {
    pub output_id: OutputId,
    pub txid: [u8; 32],
    pub vout: u32,
    pub satoshis: u64,
    pub locking_script: Vec<u8>,
    pub spent: bool,
    pub spending_txid: Option<[u8; 32]>,
    pub created_at: String,
    pub updated_at: String,
}

impl StoredChangeOutput {
    pub fn as_change_input(&self) -> ChangeInput {
        ChangeInput {
            output_id: self.output_id,
            satoshis: self.satoshis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRun {
    pub run_id: RunId,
    pub status: RunStatus,
    pub spending_txid: Option<[u8; 32]>,
    pub created_at: String,
    pub updated_at: String,
}

// --- WalletStore ---

/// Persistent change pool: stored change outputs, generation runs and the
/// claims runs hold on outputs.
///
/// All methods take `&mut self` because Diesel's `SqliteConnection` requires
/// `&mut` for all operations, including reads. Several `WalletStore`s may
/// share one database file; claims stay exclusive across them.
pub struct WalletStore {
    conn: SqliteConnection,
}

impl WalletStore {
    /// Open (or create) a store at the given file path. Runs migrations automatically.
    pub fn open(path: &str) -> crate::Result<Self> {
        let conn = SqliteConnection::establish(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store for tests.
    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = SqliteConnection::establish(":memory:")?;
        Self::init(conn)
    }

    fn init(mut conn: SqliteConnection) -> crate::Result<Self> {
        conn.batch_execute(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"
        ))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(WalletStore { conn })
    }

    // ==================== Change Outputs ====================

    /// Add a change output to the pool. Adding the same outpoint twice is a
    /// no-op returning the existing id.
    pub fn add_change_output(&mut self, output: &NewChangeOutput) -> crate::Result<OutputId> {
        let row = new_change_output_row(output)?;

        self.conn.immediate_transaction(|conn| {
            let existing: Option<i64> = change_outputs::table
                .filter(
                    change_outputs::txid
                        .eq(&row.txid)
                        .and(change_outputs::vout.eq(row.vout)),
                )
                .select(change_outputs::output_id)
                .first(conn)
                .optional()?;

            if let Some(output_id) = existing {
                return Ok(output_id);
            }

            diesel::insert_into(change_outputs::table)
                .values(&row)
                .execute(conn)?;
            last_insert_rowid(conn)
        })
    }

    pub fn get_change_output(
        &mut self,
        output_id: OutputId,
    ) -> crate::Result<Option<StoredChangeOutput>> {
        let row: Option<ChangeOutputRow> = change_outputs::table
            .find(output_id)
            .first(&mut self.conn)
            .optional()?;

        row.as_ref().map(StoredChangeOutput::try_from).transpose()
    }

    /// Unspent change outputs not claimed by any run, by output id.
    pub fn list_spendable_change(&mut self) -> crate::Result<Vec<StoredChangeOutput>> {
        let rows: Vec<ChangeOutputRow> = spendable()
            .order(change_outputs::output_id.asc())
            .load(&mut self.conn)?;

        rows.iter().map(StoredChangeOutput::try_from).collect()
    }

    pub fn spendable_balance(&mut self) -> crate::Result<u64> {
        let amounts: Vec<i64> = spendable()
            .select(change_outputs::satoshis)
            .load(&mut self.conn)?;

        amounts.into_iter().try_fold(0u64, |total, sats| {
            total
                .checked_add(sats_from_i64(sats)?)
                .ok_or_else(|| StoreError::InvalidData("spendable balance overflows".into()))
        })
    }

    pub fn spendable_count(&mut self) -> crate::Result<u64> {
        let count: i64 = spendable().count().get_result(&mut self.conn)?;
        Ok(count as u64)
    }

    // ==================== Generation Runs ====================

    pub fn begin_run(&mut self) -> crate::Result<RunId> {
        self.conn.immediate_transaction(|conn| {
            diesel::insert_into(generation_runs::table)
                .values(&NewGenerationRunRow {
                    status: RunStatus::Open.as_i32(),
                })
                .execute(conn)?;
            last_insert_rowid(conn)
        })
    }

    pub fn get_run(&mut self, run_id: RunId) -> crate::Result<Option<GenerationRun>> {
        let row: Option<GenerationRunRow> = generation_runs::table
            .find(run_id)
            .first(&mut self.conn)
            .optional()?;

        row.as_ref().map(GenerationRun::try_from).transpose()
    }

    /// Claim one spendable change output for `run_id`.
    ///
    /// Selection and claim happen in one write transaction. If another
    /// connection still wins the claim the unique key on the allocation
    /// table rejects ours, and the selection is retried once.
    pub fn allocate_change_output(
        &mut self,
        run_id: RunId,
        target_satoshis: u64,
        exact_satoshis: Option<u64>,
    ) -> crate::Result<Option<ChangeInput>> {
        self.retry_lost_claim(run_id, |store| {
            store.try_allocate(run_id, target_satoshis, exact_satoshis)
        })
    }

    /// Run `attempt`, and once more if it lost a claim to another run.
    fn retry_lost_claim<T>(
        &mut self,
        run_id: RunId,
        mut attempt: impl FnMut(&mut Self) -> crate::Result<T>,
    ) -> crate::Result<T> {
        match attempt(self) {
            Err(e) if e.is_unique_violation() => {
                log::warn!("run {run_id}: change output claimed concurrently, retrying selection");
                attempt(self)
            }
            other => other,
        }
    }

    fn try_allocate(
        &mut self,
        run_id: RunId,
        target_satoshis: u64,
        exact_satoshis: Option<u64>,
    ) -> crate::Result<Option<ChangeInput>> {
        self.conn.immediate_transaction(|conn| {
            ensure_open(conn, run_id)?;
            let Some(candidate) = select_spendable(conn, target_satoshis, exact_satoshis)? else {
                return Ok(None);
            };

            insert_claim(conn, candidate.output_id, run_id)?;

            log::debug!(
                "run {run_id}: claimed change output {} ({} sat)",
                candidate.output_id,
                candidate.satoshis
            );
            Ok(Some(candidate))
        })
    }

    /// Return a claimed output to the pool. Fails if `run_id` does not hold it.
    pub fn release_change_output(
        &mut self,
        run_id: RunId,
        output_id: OutputId,
    ) -> crate::Result<()> {
        self.conn.immediate_transaction(|conn| {
            ensure_open(conn, run_id)?;
            let deleted = diesel::delete(
                change_allocations::table.filter(
                    change_allocations::output_id
                        .eq(output_id)
                        .and(change_allocations::run_id.eq(run_id)),
                ),
            )
            .execute(conn)?;

            if deleted == 0 {
                return Err(StoreError::NotAllocated { output_id, run_id });
            }
            Ok(())
        })
    }

    /// Outputs currently claimed by `run_id`, by output id.
    pub fn run_allocations(&mut self, run_id: RunId) -> crate::Result<Vec<ChangeInput>> {
        let rows: Vec<(i64, i64)> = change_allocations::table
            .inner_join(change_outputs::table)
            .filter(change_allocations::run_id.eq(run_id))
            .select((change_outputs::output_id, change_outputs::satoshis))
            .order(change_outputs::output_id.asc())
            .load(&mut self.conn)?;

        rows.into_iter().map(change_input_from_pair).collect()
    }

    /// Settle a run: its claimed outputs become spent by `spending_txid`, the
    /// new change outputs join the pool. Returns the ids of the new outputs.
    pub fn complete_run(
        &mut self,
        run_id: RunId,
        spending_txid: &[u8; 32],
        new_change: &[NewChangeOutput],
    ) -> crate::Result<Vec<OutputId>> {
        let rows = new_change
            .iter()
            .map(new_change_output_row)
            .collect::<crate::Result<Vec<_>>>()?;
        let txid = spending_txid.to_vec();

        let created = self.conn.immediate_transaction(|conn| {
            ensure_open(conn, run_id)?;

            let held: Vec<i64> = change_allocations::table
                .filter(change_allocations::run_id.eq(run_id))
                .select(change_allocations::output_id)
                .load(conn)?;

            diesel::update(change_outputs::table.filter(change_outputs::output_id.eq_any(&held)))
                .set((
                    change_outputs::spent.eq(1),
                    change_outputs::spending_txid.eq(txid.clone()),
                    change_outputs::updated_at
                        .eq(diesel::dsl::sql::<Text>(DATETIME_NOW)),
                ))
                .execute(conn)?;

            diesel::delete(change_allocations::table.filter(change_allocations::run_id.eq(run_id)))
                .execute(conn)?;

            let mut created = Vec::with_capacity(rows.len());
            for row in &rows {
                diesel::insert_into(change_outputs::table)
                    .values(row)
                    .execute(conn)?;
                created.push(last_insert_rowid(conn)?);
            }

            diesel::update(generation_runs::table.find(run_id))
                .set((
                    generation_runs::status.eq(RunStatus::Completed.as_i32()),
                    generation_runs::spending_txid.eq(txid.clone()),
                    generation_runs::updated_at.eq(diesel::dsl::sql::<Text>(DATETIME_NOW)),
                ))
                .execute(conn)?;

            log::info!(
                "run {run_id}: completed by {}, {} change outputs spent, {} created",
                hex::encode(spending_txid),
                held.len(),
                created.len()
            );
            Ok::<_, StoreError>(created)
        })?;

        Ok(created)
    }

    /// Drop every claim held by `run_id` and mark it aborted. Returns how many
    /// outputs went back to the pool.
    pub fn abort_run(&mut self, run_id: RunId) -> crate::Result<usize> {
        self.conn.immediate_transaction(|conn| {
            ensure_open(conn, run_id)?;

            let released = diesel::delete(
                change_allocations::table.filter(change_allocations::run_id.eq(run_id)),
            )
            .execute(conn)?;

            diesel::update(generation_runs::table.find(run_id))
                .set((
                    generation_runs::status.eq(RunStatus::Aborted.as_i32()),
                    generation_runs::updated_at.eq(diesel::dsl::sql::<Text>(DATETIME_NOW)),
                ))
                .execute(conn)?;

            log::debug!("run {run_id}: aborted, {released} change outputs released");
            Ok(released)
        })
    }
}

// --- Query helpers ---

/// Unspent change outputs with no claim on them.
fn spendable() -> change_outputs::BoxedQuery<'static, Sqlite> {
    change_outputs::table
        .filter(change_outputs::spent.eq(0))
        .filter(
            change_outputs::output_id
                .ne_all(change_allocations::table.select(change_allocations::output_id)),
        )
        .into_boxed()
}

/// Pick a spendable output: an exact match, else the smallest one covering
/// the target, else the largest one below it. Ties go to the lowest id.
fn select_spendable(
    conn: &mut SqliteConnection,
    target_satoshis: u64,
    exact_satoshis: Option<u64>,
) -> crate::Result<Option<ChangeInput>> {
    let columns = (change_outputs::output_id, change_outputs::satoshis);
    let target = bound_to_i64(target_satoshis);

    if let Some(exact) = exact_satoshis.and_then(|e| i64::try_from(e).ok()) {
        let hit: Option<(i64, i64)> = spendable()
            .filter(change_outputs::satoshis.eq(exact))
            .select(columns)
            .order(change_outputs::output_id.asc())
            .first(conn)
            .optional()?;
        if let Some(pair) = hit {
            return change_input_from_pair(pair).map(Some);
        }
    }

    let covering: Option<(i64, i64)> = spendable()
        .filter(change_outputs::satoshis.ge(target))
        .select(columns)
        .order((
            change_outputs::satoshis.asc(),
            change_outputs::output_id.asc(),
        ))
        .first(conn)
        .optional()?;
    if let Some(pair) = covering {
        return change_input_from_pair(pair).map(Some);
    }

    let largest_below: Option<(i64, i64)> = spendable()
        .filter(change_outputs::satoshis.lt(target))
        .select(columns)
        .order((
            change_outputs::satoshis.desc(),
            change_outputs::output_id.asc(),
        ))
        .first(conn)
        .optional()?;

    largest_below.map(change_input_from_pair).transpose()
}

fn ensure_open(conn: &mut SqliteConnection, run_id: RunId) -> crate::Result<()> {
    let status: Option<i32> = generation_runs::table
        .find(run_id)
        .select(generation_runs::status)
        .first(conn)
        .optional()?;

    match status.map(RunStatus::from_i32).transpose()? {
        None => Err(StoreError::RunNotFound(run_id)),
        Some(RunStatus::Open) => Ok(()),
        Some(_) => Err(StoreError::RunNotOpen(run_id)),
    }
}

fn insert_claim(conn: &mut SqliteConnection, output_id: OutputId, run_id: RunId) -> crate::Result<()> {
    diesel::insert_into(change_allocations::table)
        .values(&NewAllocationRow { output_id, run_id })
        .execute(conn)?;
    Ok(())
}

fn last_insert_rowid(conn: &mut SqliteConnection) -> crate::Result<i64> {
    let row_id: i64 =
        diesel::select(diesel::dsl::sql::<BigInt>("last_insert_rowid()")).get_result(conn)?;
    Ok(row_id)
}
