mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{B256, U256};
use tokio::sync::broadcast;

use common::*;
use smooth::{
    encode_transfer, recover_signer, ApprovalCache, ApprovalOutcome, ApprovalStatus, Credential,
    FailureCause, InMemoryApprovalCache, RecoverableSignature, Relay, RelayClient, SmoothConfig,
    SmoothError, TokenAmount, TransactionId, TransferEvent, TransferOrchestrator, TransferRequest,
    TransferState, TronAddress,
};

fn usdt(amount: &str) -> TokenAmount {
    TokenAmount::parse(amount, 6).unwrap()
}

fn drain(events: &mut broadcast::Receiver<TransferEvent>) -> Vec<TransferState> {
    let mut seen = Vec::new();
    while let Ok(state) = events.try_recv() {
        seen.push(state);
    }
    seen
}

struct Harness<R> {
    sender: TronAddress,
    chain: Arc<FakeChain>,
    cache: Arc<InMemoryApprovalCache>,
    orchestrator: TransferOrchestrator<FakeChain, R>,
}

fn harness<R: Relay>(config: SmoothConfig, chain: FakeChain, relay: R, approved: bool) -> Harness<R> {
    let (sender, credential) = signer();
    harness_with(config, chain, relay, approved, sender, Some(credential))
}

fn harness_with<R: Relay>(
    config: SmoothConfig,
    chain: FakeChain,
    relay: R,
    approved: bool,
    sender: TronAddress,
    credential: Option<Arc<dyn Credential>>,
) -> Harness<R> {
    let chain = Arc::new(chain);
    let cache = Arc::new(InMemoryApprovalCache::new());
    if approved {
        granted(cache.as_ref(), sender);
    }
    let orchestrator =
        TransferOrchestrator::new(config, sender, credential, chain.clone(), cache.clone(), relay);
    Harness {
        sender,
        chain,
        cache,
        orchestrator,
    }
}

// ============================================================================
// Validation: nothing leaves Idle, nothing touches the network
// ============================================================================

#[tokio::test]
async fn test_overspend_rejected_before_any_call() {
    let relay = FakeRelay::new(RelayBehavior::Accept);
    let h = harness(config(), FakeChain::default(), relay.clone(), true);
    let mut events = h.orchestrator.subscribe();

    // balance 5, fee 1.5, amount 4
    let err = h
        .orchestrator
        .transfer(RECIPIENT, "4", &usdt("5"))
        .await
        .unwrap_err();

    assert!(matches!(err, SmoothError::Range(_)), "{err:?}");
    assert_eq!(h.chain.calls(), 0);
    assert_eq!(relay.count(), 0);
    assert_eq!(h.orchestrator.state(), TransferState::Idle);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_exact_balance_is_allowed() {
    let relay = FakeRelay::new(RelayBehavior::Accept);
    let h = harness(config(), FakeChain::default(), relay.clone(), true);

    h.orchestrator
        .transfer(RECIPIENT, "3.5", &usdt("5"))
        .await
        .unwrap();
    assert_eq!(relay.count(), 1);
}

#[tokio::test]
async fn test_bad_input_rejected_before_any_call() {
    let relay = FakeRelay::new(RelayBehavior::Accept);
    let h = harness(config(), FakeChain::default(), relay.clone(), true);
    let balance = usdt("100");

    let err = h
        .orchestrator
        .transfer("TNotAnAddress", "1", &balance)
        .await
        .unwrap_err();
    assert!(matches!(err, SmoothError::InvalidAddress(_)), "{err:?}");

    let err = h
        .orchestrator
        .transfer(RECIPIENT, "10.0000001", &balance)
        .await
        .unwrap_err();
    assert!(matches!(err, SmoothError::Precision(_)), "{err:?}");

    let err = h
        .orchestrator
        .transfer(RECIPIENT, "0", &balance)
        .await
        .unwrap_err();
    assert!(matches!(err, SmoothError::Range(_)), "{err:?}");

    let err = h
        .orchestrator
        .transfer(RECIPIENT, "-1", &balance)
        .await
        .unwrap_err();
    assert!(matches!(err, SmoothError::Range(_)), "{err:?}");

    assert_eq!(h.chain.calls(), 0);
    assert_eq!(relay.count(), 0);
}

// ============================================================================
// Happy path against a real HTTP relay
// ============================================================================

#[tokio::test]
async fn test_cached_approval_relays_and_succeeds() {
    let stub = spawn_stub(200, r#"{"txID":"abc123"}"#).await;
    let mut config = config();
    config.relay_url = stub.base_url.clone();
    let relay = RelayClient::from_config(&config).unwrap();

    let h = harness(config.clone(), FakeChain::with_nonce(7), relay, true);
    let mut events = h.orchestrator.subscribe();

    let receipt = h
        .orchestrator
        .transfer(RECIPIENT, "10", &usdt("100"))
        .await
        .unwrap();

    assert_eq!(receipt.tx_id, TransactionId("abc123".into()));
    assert_eq!(receipt.nonce, U256::from(7u64));
    assert_eq!(
        drain(&mut events),
        vec![
            TransferState::ApprovalPending,
            TransferState::NonceResolving,
            TransferState::Signing,
            TransferState::Relaying,
            TransferState::Succeeded {
                tx_id: TransactionId("abc123".into())
            },
            TransferState::Idle,
        ]
    );
    assert_eq!(h.orchestrator.state(), TransferState::Idle);

    // Cached approval: no allowance read.
    assert_eq!(h.chain.allowance_reads.load(Ordering::SeqCst), 0);
    assert_eq!(h.chain.nonce_reads.load(Ordering::SeqCst), 1);

    assert_eq!(stub.hits(), 1);
    let request = stub.last();
    assert!(request.head.starts_with("POST /transfer "), "{}", request.head);
    let body = request.json();
    assert_eq!(body["from"], h.sender.to_base58());
    assert_eq!(body["to"], RECIPIENT);
    assert_eq!(body["transferAmount"], "10000000");
    assert_eq!(body["feeAmount"], "1500000");
    assert_eq!(body["nonce"], 7);

    // The submitted signature recovers to the sender over the same message.
    let signature = RecoverableSignature {
        r: body["r"].as_str().unwrap().parse::<B256>().unwrap(),
        s: body["s"].as_str().unwrap().parse::<B256>().unwrap(),
        v: body["v"].as_u64().unwrap() as u8,
    };
    let expected = TransferRequest::new(
        &config,
        h.sender,
        RECIPIENT.parse().unwrap(),
        usdt("10"),
    )
    .unwrap();
    let message = encode_transfer(&expected, U256::from(7u64));
    assert_eq!(recover_signer(&message, &signature).unwrap(), h.sender);
}

#[tokio::test]
async fn test_relay_rejection_is_reported_without_retry() {
    let stub = spawn_stub(400, r#"{"error":"nonce too low"}"#).await;
    let mut config = config();
    config.relay_url = stub.base_url.clone();
    let relay = RelayClient::from_config(&config).unwrap();

    let h = harness(config, FakeChain::with_nonce(3), relay, true);
    let mut events = h.orchestrator.subscribe();

    let err = h
        .orchestrator
        .transfer(RECIPIENT, "1", &usdt("100"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        SmoothError::RelayRejected {
            status: Some(400),
            reason: "nonce too low".into(),
            body: r#"{"error":"nonce too low"}"#.into(),
        }
    );
    assert_eq!(stub.hits(), 1);

    let seen = drain(&mut events);
    let failed = &seen[seen.len() - 2];
    match failed {
        TransferState::Failed { cause, reason } => {
            assert_eq!(*cause, FailureCause::RelayRejected);
            assert!(reason.contains("nonce too low"), "{reason}");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(seen.last(), Some(&TransferState::Idle));
    assert_eq!(h.orchestrator.state(), TransferState::Idle);
}

// ============================================================================
// Nonce and approval behaviour across attempts
// ============================================================================

#[tokio::test]
async fn test_each_attempt_reads_a_fresh_nonce() {
    let chain = Arc::new(FakeChain::default());
    let relay = FakeRelay::executing(chain.clone());
    let cache: Arc<dyn ApprovalCache> = Arc::new(InMemoryApprovalCache::new());
    let (sender, credential) = signer();
    granted(cache.as_ref(), sender);

    let orchestrator =
        TransferOrchestrator::new(config(), sender, Some(credential), chain.clone(), cache, relay.clone());

    orchestrator.transfer(RECIPIENT, "1", &usdt("100")).await.unwrap();
    orchestrator.transfer(RECIPIENT, "1", &usdt("100")).await.unwrap();

    assert_eq!(chain.nonce_reads.load(Ordering::SeqCst), 2);
    assert_eq!(relay.nonces(), vec![U256::from(0u8), U256::from(1u8)]);
}

#[tokio::test]
async fn test_cold_approval_is_submitted_once() {
    let relay = FakeRelay::new(RelayBehavior::Accept);
    let h = harness(config(), FakeChain::default(), relay.clone(), false);

    h.orchestrator.transfer(RECIPIENT, "1", &usdt("100")).await.unwrap();
    assert_eq!(h.chain.allowance_reads.load(Ordering::SeqCst), 1);
    assert_eq!(h.chain.approvals.load(Ordering::SeqCst), 1);
    assert_eq!(h.orchestrator.cached_approval(), ApprovalStatus::GrantedCachedLocally);

    h.orchestrator.transfer(RECIPIENT, "1", &usdt("100")).await.unwrap();
    let check = h.orchestrator.check_approval().await;
    assert!(check.granted);
    assert_eq!(check.outcome, ApprovalOutcome::AlreadyGranted);

    // Second send and explicit check both hit the cache.
    assert_eq!(h.chain.allowance_reads.load(Ordering::SeqCst), 1);
    assert_eq!(h.chain.approvals.load(Ordering::SeqCst), 1);
    assert_eq!(relay.count(), 2);
    assert!(h
        .cache
        .is_granted(&smooth::approval_key(h.sender, router())));
}

#[tokio::test]
async fn test_sufficient_allowance_skips_approve() {
    let chain = FakeChain::default();
    *chain.allowance.lock().unwrap() = U256::MAX;
    let relay = FakeRelay::new(RelayBehavior::Accept);
    let h = harness(config(), chain, relay, false);

    let check = h.orchestrator.check_approval().await;
    assert_eq!(check.outcome, ApprovalOutcome::AlreadyGranted);
    assert_eq!(h.chain.approvals.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Failures: terminal Failed, then back to Idle
// ============================================================================

#[tokio::test]
async fn test_denied_approval_stops_before_nonce() {
    let chain = FakeChain::default();
    chain.deny_approve.store(true, Ordering::SeqCst);
    let relay = FakeRelay::new(RelayBehavior::Accept);
    let h = harness(config(), chain, relay.clone(), false);
    let mut events = h.orchestrator.subscribe();

    let err = h
        .orchestrator
        .transfer(RECIPIENT, "1", &usdt("100"))
        .await
        .unwrap_err();

    assert!(matches!(err, SmoothError::ApprovalDenied(_)), "{err:?}");
    assert_eq!(h.chain.nonce_reads.load(Ordering::SeqCst), 0);
    assert_eq!(relay.count(), 0);
    assert_eq!(h.orchestrator.cached_approval(), ApprovalStatus::Unknown);

    let seen = drain(&mut events);
    assert_eq!(seen[0], TransferState::ApprovalPending);
    assert!(matches!(
        seen[1],
        TransferState::Failed {
            cause: FailureCause::ApprovalDenied,
            ..
        }
    ));
    assert_eq!(seen[2], TransferState::Idle);
}

#[tokio::test]
async fn test_unreadable_nonce_is_chain_unavailable() {
    let chain = FakeChain::default();
    chain.fail_nonce.store(true, Ordering::SeqCst);
    let relay = FakeRelay::new(RelayBehavior::Accept);
    let h = harness(config(), chain, relay.clone(), true);

    let err = h
        .orchestrator
        .transfer(RECIPIENT, "1", &usdt("100"))
        .await
        .unwrap_err();

    assert!(matches!(err, SmoothError::ChainUnavailable(_)), "{err:?}");
    assert_eq!(relay.count(), 0);
    assert_eq!(h.orchestrator.state(), TransferState::Idle);
}

#[tokio::test]
async fn test_missing_credential_fails_signing() {
    let (sender, _) = signer();
    let relay = FakeRelay::new(RelayBehavior::Accept);
    let h = harness_with(config(), FakeChain::default(), relay.clone(), true, sender, None);
    let mut events = h.orchestrator.subscribe();

    let err = h
        .orchestrator
        .transfer(RECIPIENT, "1", &usdt("100"))
        .await
        .unwrap_err();

    assert!(matches!(err, SmoothError::Signing(_)), "{err:?}");
    assert_eq!(relay.count(), 0);
    assert!(drain(&mut events).iter().any(|s| matches!(
        s,
        TransferState::Failed {
            cause: FailureCause::SigningFailed,
            ..
        }
    )));
}

#[tokio::test]
async fn test_oversized_nonce_fails_before_signing() {
    let chain = FakeChain::default();
    *chain.nonce.lock().unwrap() = U256::from(u64::MAX) + U256::from(1u8);
    let relay = FakeRelay::new(RelayBehavior::Accept);
    let h = harness(config(), chain, relay.clone(), true);
    let mut events = h.orchestrator.subscribe();

    let err = h
        .orchestrator
        .transfer(RECIPIENT, "1", &usdt("100"))
        .await
        .unwrap_err();

    assert!(matches!(err, SmoothError::Range(_)), "{err:?}");
    assert_eq!(relay.count(), 0);
    let seen = drain(&mut events);
    assert!(!seen.contains(&TransferState::Signing), "{seen:?}");
    assert!(!seen.contains(&TransferState::Relaying), "{seen:?}");
    assert_eq!(seen.last(), Some(&TransferState::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_relay_times_out() {
    let mut config = config();
    config.relay_timeout = Duration::from_secs(5);
    let relay = FakeRelay::new(RelayBehavior::Stall);
    let h = harness(config, FakeChain::default(), relay, true);

    let err = h
        .orchestrator
        .transfer(RECIPIENT, "1", &usdt("100"))
        .await
        .unwrap_err();
    assert!(matches!(err, SmoothError::Timeout(_)), "{err:?}");
    assert_eq!(h.orchestrator.state(), TransferState::Idle);
}

#[tokio::test]
async fn test_relay_double_rejection_keeps_reason() {
    let relay = FakeRelay::new(RelayBehavior::Reject {
        status: 409,
        reason: "nonce already used",
    });
    let h = harness(config(), FakeChain::default(), relay.clone(), true);

    let err = h
        .orchestrator
        .transfer(RECIPIENT, "1", &usdt("100"))
        .await
        .unwrap_err();
    assert_eq!(err.cause(), FailureCause::RelayRejected);
    assert!(err.to_string().contains("nonce already used"));
    assert_eq!(relay.count(), 1);
}

// ============================================================================
// Session: one transfer at a time
// ============================================================================

#[tokio::test]
async fn test_concurrent_transfer_is_refused() {
    let relay = FakeRelay::held();
    let h = harness(config(), FakeChain::default(), relay.clone(), true);
    let balance = usdt("100");
    let mut events = h.orchestrator.subscribe();

    let first = h.orchestrator.transfer(RECIPIENT, "1", &balance);
    let second = async {
        while events.recv().await.unwrap() != TransferState::Relaying {}
        let result = h.orchestrator.transfer(RECIPIENT, "2", &balance).await;
        relay.release();
        result
    };

    let (first, second) = tokio::join!(first, second);
    assert!(first.is_ok());
    assert_eq!(second.unwrap_err(), SmoothError::TransferInProgress);
    assert_eq!(relay.count(), 1);
}

#[tokio::test]
async fn test_dropped_transfer_releases_session() {
    let relay = FakeRelay::held();
    let h = harness(config(), FakeChain::default(), relay.clone(), true);
    let balance = usdt("100");
    let mut events = h.orchestrator.subscribe();

    tokio::select! {
        _ = h.orchestrator.transfer(RECIPIENT, "1", &balance) => panic!("relay is held"),
        _ = async { while events.recv().await.unwrap() != TransferState::Relaying {} } => {}
    }

    assert_eq!(h.orchestrator.state(), TransferState::Idle);

    relay.release();
    h.orchestrator
        .transfer(RECIPIENT, "1", &balance)
        .await
        .unwrap();
    assert_eq!(relay.count(), 2);
}

#[tokio::test]
async fn test_fetch_balance_reads_chain() {
    let chain = FakeChain::default();
    *chain.balance.lock().unwrap() = U256::from(25_500_000u64);
    let h = harness(config(), chain, FakeRelay::new(RelayBehavior::Accept), true);

    let balance = h.orchestrator.fetch_balance().await.unwrap();
    assert_eq!(balance.to_string(), "25.5");
    assert_eq!(h.chain.balance_reads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_balance_read_reports_timeout() {
    let mut config = config();
    config.chain_timeout = Duration::from_secs(7);
    let chain = FakeChain::default();
    chain.stall_balance.store(true, Ordering::SeqCst);
    let h = harness(config, chain, FakeRelay::new(RelayBehavior::Accept), true);

    let err = h.orchestrator.fetch_balance().await.unwrap_err();
    assert_eq!(
        err,
        SmoothError::Timeout("balance read timed out after 7s".to_string())
    );
}
