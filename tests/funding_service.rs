use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use wallet_backend::{BackendConfig, BackendError, FundingRequest, FundingService};
use wallet_sdk::testing::{REFERENCE_POOL, REFERENCE_RANDOM_VALUES};
use wallet_sdk::{Error, FeeModel, FixedOutput};
use wallet_store::{NewChangeOutput, RunStatus, WalletStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn change_output(tag: u8, vout: u32, satoshis: u64) -> NewChangeOutput {
    NewChangeOutput {
        txid: [tag; 32],
        vout,
        satoshis,
        locking_script: vec![0x76, 0xa9, 0x14],
    }
}

fn config(desired_utxo_count: u32) -> BackendConfig {
    let mut config = BackendConfig::default();
    config.fee_model = FeeModel::sat_per_kb(2);
    config.change_basket.desired_utxo_count = desired_utxo_count;
    config.no_logging = true;
    config
}

async fn service_with(amounts: &[u64], config: BackendConfig) -> FundingService {
    let store = WalletStore::open_in_memory().unwrap();
    let service = FundingService::with_store(Arc::new(Mutex::new(store)), config);
    for (vout, &sats) in amounts.iter().enumerate() {
        service
            .add_change_output(change_output(0xaa, vout as u32, sats))
            .await
            .unwrap();
    }
    service
}

fn reference_amounts() -> Vec<u64> {
    REFERENCE_POOL.iter().map(|&(_, sats)| sats).collect()
}

fn large_output_request() -> FundingRequest {
    FundingRequest {
        fixed_outputs: vec![
            FixedOutput {
                satoshis: 1234,
                locking_script_length: 1_739_091,
            },
            FixedOutput {
                satoshis: 2,
                locking_script_length: 25,
            },
        ],
        random_values: Some(REFERENCE_RANDOM_VALUES.to_vec()),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fund_then_complete() {
    let service = service_with(&reference_amounts(), config(0)).await;

    let funded = service.fund(large_output_request()).await.unwrap();
    let result = &funded.result;
    assert_eq!(result.allocated_change_inputs.len(), 1);
    assert_eq!(result.allocated_change_inputs[0].satoshis, 6323);
    assert_eq!(result.change_outputs.len(), 1);
    assert_eq!(result.change_outputs[0].satoshis, 1608);
    assert_eq!(result.size, 1_739_330);
    assert_eq!(result.fee, 3479);

    // claimed but not yet spent
    let balance = service.balance().await.unwrap();
    assert_eq!(balance.count, 10);
    assert_eq!(balance.satoshis, 31_519 - 6323);

    let txid = [0x55; 32];
    let created = service
        .complete(funded.run_id, txid, vec![change_output(0x55, 2, 1608)])
        .await
        .unwrap();
    assert_eq!(created.len(), 1);

    let balance = service.balance().await.unwrap();
    assert_eq!(balance.count, 11);
    assert_eq!(balance.satoshis, 31_519 - 6323 + 1608);

    let store = service.store();
    let mut store = store.lock().unwrap();
    let run = store.get_run(funded.run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    let spent = store
        .get_change_output(result.allocated_change_inputs[0].output_id)
        .unwrap()
        .unwrap();
    assert!(spent.spent);
    assert_eq!(spent.spending_txid, Some(txid));
}

#[tokio::test]
async fn basket_shortfall_sets_the_net_count() {
    // 11 spendable outputs against a basket of 15 asks for 4 more
    let service = service_with(&reference_amounts(), config(15)).await;

    let funded = service.fund(large_output_request()).await.unwrap();
    let sats: Vec<u64> = funded
        .result
        .change_outputs
        .iter()
        .map(|o| o.satoshis)
        .collect();
    assert_eq!(funded.result.allocated_change_inputs[0].satoshis, 16_151);
    assert_eq!(sats, vec![1922, 2301, 1594, 3304, 2315]);
    assert_eq!(funded.result.size, 1_739_466);
}

#[tokio::test]
async fn explicit_net_count_wins_over_basket() {
    let service = service_with(&reference_amounts(), config(15)).await;
    let mut request = large_output_request();
    request.target_net_count = Some(0);

    let funded = service.fund(request).await.unwrap();
    assert_eq!(funded.result.allocated_change_inputs[0].satoshis, 16_151);
    assert_eq!(funded.result.change_outputs.len(), 1);
    assert_eq!(funded.result.change_outputs[0].satoshis, 11_436);
}

#[tokio::test]
async fn insufficient_funds_aborts_the_run() {
    let service = service_with(&[1000, 1000], config(0)).await;

    let err = service.fund(large_output_request()).await.unwrap_err();
    assert!(err.is_insufficient_funds());
    assert!(matches!(
        err,
        BackendError::Sdk(Error::InsufficientFunds {
            required: 4715,
            shortfall: 2715
        })
    ));

    let balance = service.balance().await.unwrap();
    assert_eq!(balance.count, 2);
    assert_eq!(balance.satoshis, 2000);

    // the run the failed attempt opened is closed
    let store = service.store();
    let mut store = store.lock().unwrap();
    let run = store.get_run(1).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Aborted);
}

#[tokio::test]
async fn invalid_request_aborts_the_run() {
    let service = service_with(&reference_amounts(), config(0)).await;
    let mut request = large_output_request();
    request.random_values = Some(vec![1.5]);

    let err = service.fund(request).await.unwrap_err();
    assert!(matches!(
        err,
        BackendError::Sdk(Error::InvalidParameter {
            name: "randomValues",
            ..
        })
    ));
    assert_eq!(service.balance().await.unwrap().count, 11);
}

#[tokio::test]
async fn abort_returns_claims() {
    let service = service_with(&reference_amounts(), config(0)).await;
    let funded = service.fund(large_output_request()).await.unwrap();
    assert_eq!(service.balance().await.unwrap().count, 10);

    assert_eq!(service.abort(funded.run_id).await.unwrap(), 1);
    assert_eq!(service.balance().await.unwrap().count, 11);

    // the same request now gets the same plan again
    let again = service.fund(large_output_request()).await.unwrap();
    assert_eq!(again.result, funded.result);
    assert_ne!(again.run_id, funded.run_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_funding_never_shares_inputs() {
    let amounts: Vec<u64> = vec![10_000; 20];
    let service = Arc::new(service_with(&amounts, config(0)).await);
    let request = FundingRequest {
        fixed_outputs: vec![FixedOutput {
            satoshis: 500,
            locking_script_length: 25,
        }],
        fee_model: Some(FeeModel::sat_per_kb(100)),
        ..Default::default()
    };

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let request = request.clone();
        handles.push(tokio::spawn(async move {
            service.fund(request).await.unwrap()
        }));
    }

    let mut seen = HashSet::new();
    let mut runs = HashSet::new();
    for handle in handles {
        let funded = handle.await.unwrap();
        assert!(runs.insert(funded.run_id));
        assert_eq!(funded.result.fee, 23);
        for input in &funded.result.allocated_change_inputs {
            assert!(seen.insert(input.output_id), "output {} claimed twice", input.output_id);
        }
    }
    assert_eq!(seen.len(), 8);
    assert_eq!(service.balance().await.unwrap().count, 12);
}

#[tokio::test]
async fn open_creates_the_database_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(0);
    config.database_path = dir.path().join("pool.db");

    {
        let service = FundingService::open(config.clone()).unwrap();
        for (vout, sats) in reference_amounts().into_iter().enumerate() {
            service
                .add_change_output(change_output(0xbb, vout as u32, sats))
                .await
                .unwrap();
        }
    }

    let service = FundingService::open(config).unwrap();
    assert_eq!(service.balance().await.unwrap().satoshis, 31_519);
    let funded = service.fund(large_output_request()).await.unwrap();
    assert_eq!(funded.result.fee, 3479);
}
