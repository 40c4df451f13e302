//! `FundingService`: change generation runs against the persistent pool.
//!
//! Every `fund` call opens a generation run in the store, drives the change
//! generator with a [`StoreAllocator`] bound to that run, and hands back the
//! run id with the result. The caller then either `complete`s the run once
//! the transaction is signed and broadcast, or `abort`s it. A failed `fund`
//! aborts its own run, so no claim outlives an error.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use wallet_sdk::{ChangeGenerator, FeeModel, FixedInput, FixedOutput, GenerationResult, OutputId};
use wallet_store::{NewChangeOutput, RunId, WalletStore};

use crate::allocator::{with_store, StoreAllocator};
use crate::config::BackendConfig;
use crate::error::Result;

/// A transaction to fund from the change pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FundingRequest {
    pub fixed_inputs: Vec<FixedInput>,
    pub fixed_outputs: Vec<FixedOutput>,
    /// Overrides the net count derived from the configured change basket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_net_count: Option<i64>,
    /// Overrides the configured fee model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_model: Option<FeeModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_values: Option<Vec<f64>>,
}

/// A funded run awaiting `complete` or `abort`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundedTransaction {
    pub run_id: RunId,
    pub result: GenerationResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub satoshis: u64,
    pub count: u64,
}

pub struct FundingService {
    store: Arc<Mutex<WalletStore>>,
    config: BackendConfig,
}

impl FundingService {
    /// Open the store named by `config` (running migrations) and wrap it.
    pub fn open(config: BackendConfig) -> Result<Self> {
        let store = WalletStore::open(config.database_path_str()?)?;
        Ok(Self::with_store(Arc::new(Mutex::new(store)), config))
    }

    /// Use an already opened, possibly shared, store.
    pub fn with_store(store: Arc<Mutex<WalletStore>>, config: BackendConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<Mutex<WalletStore>> {
        self.store.clone()
    }

    /// Fund `request` from the change pool.
    ///
    /// The claimed outputs stay allocated to the returned run until
    /// [`complete`](Self::complete) or [`abort`](Self::abort).
    pub async fn fund(&self, request: FundingRequest) -> Result<FundedTransaction> {
        let run_id = with_store(&self.store, |store| store.begin_run()).await?;

        match self.fund_run(run_id, &request).await {
            Ok(result) => {
                if !self.config.no_logging {
                    log::info!(
                        "run {run_id}: funded with {} change inputs, {} change outputs, fee {}",
                        result.allocated_change_inputs.len(),
                        result.change_outputs.len(),
                        result.fee
                    );
                }
                Ok(FundedTransaction { run_id, result })
            }
            Err(e) => {
                match with_store(&self.store, move |store| store.abort_run(run_id)).await {
                    Ok(released) => log::debug!(
                        "run {run_id}: funding failed ({e}), released {released} change outputs"
                    ),
                    Err(abort_err) => {
                        log::warn!("run {run_id}: abort after failed funding failed: {abort_err}")
                    }
                }
                Err(e)
            }
        }
    }

    async fn fund_run(&self, run_id: RunId, request: &FundingRequest) -> Result<GenerationResult> {
        let target_net_count = match request.target_net_count {
            Some(target) => Some(target),
            None => self.basket_net_count().await?,
        };
        let params = self.config.generation_params(request, target_net_count);

        let allocator = StoreAllocator::new(self.store.clone(), run_id);
        let mut generator = ChangeGenerator::new(allocator);
        Ok(generator.generate(&params).await?)
    }

    /// Outputs the basket is short of (negative when over), or `None` when
    /// the basket does not ask for a count.
    async fn basket_net_count(&self) -> Result<Option<i64>> {
        let desired = self.config.change_basket.desired_utxo_count;
        if desired == 0 {
            return Ok(None);
        }
        let spendable = with_store(&self.store, |store| store.spendable_count()).await?;
        let spendable = i64::try_from(spendable).unwrap_or(i64::MAX);
        Ok(Some(i64::from(desired) - spendable))
    }

    /// Settle a funded run after its transaction `txid` was broadcast.
    /// `change` lists the run's change outputs as they appear in that
    /// transaction. Returns the ids of the new pool entries.
    pub async fn complete(
        &self,
        run_id: RunId,
        txid: [u8; 32],
        change: Vec<NewChangeOutput>,
    ) -> Result<Vec<OutputId>> {
        with_store(&self.store, move |store| {
            store.complete_run(run_id, &txid, &change)
        })
        .await
    }

    /// Release every claim of a funded run. Returns how many were released.
    pub async fn abort(&self, run_id: RunId) -> Result<usize> {
        with_store(&self.store, move |store| store.abort_run(run_id)).await
    }

    pub async fn add_change_output(&self, output: NewChangeOutput) -> Result<OutputId> {
        with_store(&self.store, move |store| store.add_change_output(&output)).await
    }

    pub async fn balance(&self) -> Result<Balance> {
        with_store(&self.store, |store| {
            Ok(Balance {
                satoshis: store.spendable_balance()?,
                count: store.spendable_count()?,
            })
        })
        .await
    }
}
