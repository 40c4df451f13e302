//! `StoreAllocator`: the persistent change pool as a [`ChangeAllocator`].
//!
//! Store calls are blocking (Diesel over SQLite), so each one is dispatched
//! with `tokio::task::spawn_blocking` and the shared store mutex is taken on
//! the blocking thread, never across an await.

use std::sync::{Arc, Mutex};

use wallet_sdk::{ChangeAllocator, ChangeInput, OutputId};
use wallet_store::{RunId, WalletStore};

use crate::error::{BackendError, Result};

/// Run a closure against the shared store on a blocking thread.
pub(crate) async fn with_store<F, R>(store: &Arc<Mutex<WalletStore>>, f: F) -> Result<R>
where
    F: FnOnce(&mut WalletStore) -> wallet_store::Result<R> + Send + 'static,
    R: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || {
        let mut guard = store.lock().map_err(|_| BackendError::MutexPoisoned)?;
        f(&mut guard).map_err(BackendError::Store)
    })
    .await
    .map_err(|e| BackendError::Task(e.to_string()))?
}

/// Claims change outputs for exactly one generation run.
pub struct StoreAllocator {
    store: Arc<Mutex<WalletStore>>,
    run_id: RunId,
}

impl StoreAllocator {
    pub fn new(store: Arc<Mutex<WalletStore>>, run_id: RunId) -> Self {
        Self { store, run_id }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }
}

impl ChangeAllocator for StoreAllocator {
    type Error = BackendError;

    async fn allocate(
        &mut self,
        target_satoshis: u64,
        exact_satoshis: Option<u64>,
    ) -> Result<Option<ChangeInput>> {
        let run_id = self.run_id;
        with_store(&self.store, move |store| {
            store.allocate_change_output(run_id, target_satoshis, exact_satoshis)
        })
        .await
    }

    async fn release(&mut self, output_id: OutputId) -> Result<()> {
        let run_id = self.run_id;
        with_store(&self.store, move |store| {
            store.release_change_output(run_id, output_id)
        })
        .await
    }
}
