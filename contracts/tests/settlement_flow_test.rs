//! Settlement against the in-process ledger.
//!
//! Two swap clients negotiate over a memory hub and settle through the
//! escrow program: initializer A offers `[M1]`, taker B offers `[M2, M3]`.
//! The ledger's call log shows the order in which the escrow was driven.

use std::sync::Arc;
use std::time::Duration;

use swap_contracts::{EscrowLedger, ProgramOp};
use swap_protocol::config::DEFAULT_ESCROW_PROGRAM_ID;
use swap_protocol::escrow::{EscrowRpcClient, RpcError};
use swap_protocol::identity::{Pubkey, WalletKeypair};
use swap_protocol::settlement::{
    EscrowAgreement, SettlementError, SettlementJob, SettlementOp, SettlementStep, SwapRole,
};
use swap_protocol::{
    AssetRef, MemoryHub, PeerIdentity, SwapClient, SwapConfig, SwapError, SwapHandle, TradePhase,
    TradeSlots, TradeView,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Peer {
    handle: SwapHandle,
    id: PeerIdentity,
    key: Pubkey,
}

fn ledger() -> Arc<EscrowLedger> {
    EscrowLedger::new(DEFAULT_ESCROW_PROGRAM_ID.parse().expect("program id"))
}

fn spawn_peer(hub: &Arc<MemoryHub>, ledger: &Arc<EscrowLedger>) -> Peer {
    let key = WalletKeypair::generate().pubkey();
    let (handle, _task) = SwapClient::spawn(
        SwapConfig::default(),
        PeerIdentity::from(key),
        Arc::new(hub.transport()),
        Arc::new(ledger.client(key)),
    )
    .expect("spawn client");
    Peer {
        handle,
        id: PeerIdentity::from(key),
        key,
    }
}

async fn wait_for(peer: &Peer, what: &str, cond: impl Fn(&TradeView) -> bool) -> TradeView {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let view = peer.handle.view().await.expect("client running");
        if cond(&view) {
            return view;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}: {view:#?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

struct Deal {
    a: Peer,
    b: Peer,
    m1: AssetRef,
    m2: AssetRef,
    m3: AssetRef,
}

/// Pairs A and B, lets A propose `[M1]` for `[M2, M3]`, and has both accept.
/// A made the last edit, so A is the initializer.
async fn agree(hub: &Arc<MemoryHub>, ledger: &Arc<EscrowLedger>) -> Deal {
    let a = spawn_peer(hub, ledger);
    let b = spawn_peer(hub, ledger);
    let m1 = ledger.mint_nft(&a.key, "M1");
    let m2 = ledger.mint_nft(&b.key, "M2");
    let m3 = ledger.mint_nft(&b.key, "M3");

    a.handle.join("swap-room").await.unwrap();
    b.handle.join("swap-room").await.unwrap();
    wait_for(&a, "pairing", |v| v.partner.is_some()).await;
    wait_for(&b, "pairing", |v| v.partner.is_some()).await;

    a.handle.select_nfts(vec![m1.clone()]).await.unwrap();
    b.handle.select_nfts(vec![m2.clone(), m3.clone()]).await.unwrap();
    wait_for(&a, "b's pool", |v| {
        v.partner.as_ref().map(|p| p.selected_nfts.len()) == Some(2)
    })
    .await;

    let board = TradeSlots::from_assets(&[m1.clone()], &[m2.clone(), m3.clone()]).unwrap();
    a.handle.set_slots(board.clone()).await.unwrap();
    wait_for(&b, "board mirrored", |v| v.slots == board.inverted()).await;

    a.handle.accept().await.unwrap();
    wait_for(&b, "a accepted", |v| v.acceptance.remote_accepted).await;
    b.handle.accept().await.unwrap();

    Deal { a, b, m1, m2, m3 }
}

fn agreement(initializer: &Pubkey, taker: &Pubkey, give: &[AssetRef], take: &[AssetRef]) -> EscrowAgreement {
    let slots = TradeSlots::from_assets(give, take).unwrap();
    EscrowAgreement::from_slots(
        &PeerIdentity::from(*initializer),
        &PeerIdentity::from(*taker),
        SwapRole::Initializer,
        &slots,
        86_400,
    )
    .unwrap()
}

fn job(op: SettlementOp, agreement: &EscrowAgreement, verify_existing: bool) -> SettlementJob {
    SettlementJob {
        op,
        agreement: agreement.clone(),
        verify_existing,
    }
}

// ---------------------------------------------------------------------------
// Full Swaps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn swap_settles_in_protocol_order() {
    let hub = MemoryHub::new();
    let ledger = ledger();
    let Deal { a, b, m1, m2, m3 } = agree(&hub, &ledger).await;

    let a_view = wait_for(&a, "a settled", |v| v.phase == TradePhase::Done).await;
    let b_view = wait_for(&b, "b settled", |v| v.phase == TradePhase::Done).await;
    assert_eq!(a_view.settlement, SettlementStep::Settled);
    assert_eq!(b_view.settlement, SettlementStep::Settled);

    // Ownership swapped and the escrow is gone.
    assert!(ledger.holds(&b.key, &m1));
    assert!(ledger.holds(&a.key, &m2));
    assert!(ledger.holds(&a.key, &m3));
    assert_eq!(ledger.open_escrows(), 0);

    // initialize (+ A's deposit), then B's deposits and collect, then A's
    // collect.
    let calls = ledger.confirmed();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].signer, a.id.to_string());
    assert_eq!(calls[0].ops, vec![ProgramOp::Initialize, ProgramOp::Deposit]);
    assert_eq!(calls[1].signer, b.id.to_string());
    assert_eq!(
        calls[1].ops,
        vec![ProgramOp::Deposit, ProgramOp::Deposit, ProgramOp::Complete]
    );
    assert_eq!(calls[2].signer, a.id.to_string());
    assert_eq!(calls[2].ops, vec![ProgramOp::Complete, ProgramOp::Complete]);

    // Traded NFTs leave the offering pools.
    assert!(!a_view.selection.contains(&m1));
    assert!(b_view.selection.is_empty());
}

#[tokio::test]
async fn failed_deposit_waits_for_manual_retry() {
    let hub = MemoryHub::new();
    let ledger = ledger();
    // The first transaction with a complete is B's deposit-and-collect.
    ledger.fail_next(ProgramOp::Complete, RpcError::WalletRejected("declined".into()));
    let Deal { a, b, .. } = agree(&hub, &ledger).await;

    let b_view = wait_for(&b, "deposit failed", |v| {
        v.settlement == SettlementStep::Failed(SettlementOp::Deposit)
    })
    .await;
    assert_eq!(b_view.phase, TradePhase::Settling);
    assert_eq!(
        a.handle.view().await.unwrap().settlement,
        SettlementStep::AwaitingDeposit
    );

    b.handle.retry_settlement().await.unwrap();
    wait_for(&a, "a settled", |v| v.settlement == SettlementStep::Settled).await;
    wait_for(&b, "b settled", |v| v.settlement == SettlementStep::Settled).await;
    assert_eq!(ledger.open_escrows(), 0);
}

#[tokio::test]
async fn only_the_initializer_cancels_and_both_rounds_reset() {
    let hub = MemoryHub::new();
    let ledger = ledger();
    ledger.fail_next(ProgramOp::Complete, RpcError::Transport("down".into()));
    let Deal { a, b, m1, m2, .. } = agree(&hub, &ledger).await;
    wait_for(&b, "deposit failed", |v| {
        v.settlement == SettlementStep::Failed(SettlementOp::Deposit)
    })
    .await;

    // Refused locally, before any ledger call.
    let calls_before = ledger.calls().len();
    let err = b.handle.cancel_escrow().await.unwrap_err();
    assert!(matches!(
        err,
        SwapError::Settlement(SettlementError::NotInitializer)
    ));
    assert_eq!(ledger.calls().len(), calls_before);

    a.handle.cancel_escrow().await.unwrap();
    let a_view = wait_for(&a, "a cancelled", |v| v.settlement == SettlementStep::Cancelled).await;
    assert_eq!(a_view.phase, TradePhase::Idle);
    assert!(a_view.partner.is_some());

    let b_view = wait_for(&b, "b reset", |v| v.phase == TradePhase::Idle).await;
    assert_eq!(b_view.settlement, SettlementStep::Cancelled);

    assert!(ledger.holds(&a.key, &m1));
    assert!(ledger.holds(&b.key, &m2));
    assert_eq!(ledger.open_escrows(), 0);
}

#[tokio::test]
async fn cancel_job_refunds_and_is_idempotent() {
    let ledger = ledger();
    let a_key = WalletKeypair::generate().pubkey();
    let b_key = WalletKeypair::generate().pubkey();
    let m1 = ledger.mint_nft(&a_key, "M1");
    let m2 = ledger.mint_nft(&b_key, "M2");

    let deal = agreement(&a_key, &b_key, &[m1.clone()], &[m2]);
    let a_client = ledger.client(a_key);
    let init = job(SettlementOp::Initialize, &deal, true).run(&a_client).await;
    assert!(init.result.is_ok());
    assert!(!ledger.holds(&a_key, &m1));

    let cancel = job(SettlementOp::Cancel, &deal, false).run(&a_client).await;
    assert!(cancel.result.expect("cancel").signature.is_some());
    assert!(ledger.holds(&a_key, &m1));
    assert_eq!(ledger.open_escrows(), 0);

    // Cancelling again is a local abandon: nothing left on the ledger.
    let again = job(SettlementOp::Cancel, &deal, false).run(&a_client).await;
    assert_eq!(again.result.expect("abandon").signature, None);
}

// ---------------------------------------------------------------------------
// Escrow Guards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn complete_before_deposit_is_rejected() {
    let ledger = ledger();
    let (a, b) = (WalletKeypair::generate().pubkey(), WalletKeypair::generate().pubkey());
    let m1 = ledger.mint_nft(&a, "M1");
    let m2 = ledger.mint_nft(&b, "M2");
    let m3 = ledger.mint_nft(&b, "M3");
    let deal = agreement(&a, &b, &[m1], &[m2.clone(), m3.clone()]);
    let client = ledger.client(a);

    job(SettlementOp::Initialize, &deal, true)
        .run(&client)
        .await
        .result
        .unwrap();

    // The job checks the snapshot first and never sends the call.
    let before = ledger.calls().len();
    let outcome = job(SettlementOp::Complete, &deal, false).run(&client).await;
    assert_eq!(outcome.result, Err(SettlementError::DepositsIncomplete));
    assert_eq!(ledger.calls().len(), before);

    // Sent anyway, the program refuses it.
    let direct = client
        .complete(&PeerIdentity::from(a), &PeerIdentity::from(b), true, &[m2, m3])
        .await;
    assert!(matches!(direct, Err(RpcError::ProgramRejected(_))));
}

#[tokio::test]
async fn restarted_initializer_reuses_a_matching_escrow() {
    let ledger = ledger();
    let (a, b) = (WalletKeypair::generate().pubkey(), WalletKeypair::generate().pubkey());
    let m1 = ledger.mint_nft(&a, "M1");
    let m2 = ledger.mint_nft(&b, "M2");
    let deal = agreement(&a, &b, &[m1], &[m2]);
    let client = ledger.client(a);

    job(SettlementOp::Initialize, &deal, true)
        .run(&client)
        .await
        .result
        .unwrap();

    let again = job(SettlementOp::Initialize, &deal, true).run(&client).await;
    let success = again.result.expect("reused");
    assert_eq!(success.signature, None);
    assert!(success.snapshot.is_some());
    assert_eq!(ledger.open_escrows(), 1);

    // Without the check the program itself refuses a second escrow.
    let blind = job(SettlementOp::Initialize, &deal, false).run(&client).await;
    assert!(matches!(
        blind.result,
        Err(SettlementError::Rpc { op: SettlementOp::Initialize, .. })
    ));
}

#[tokio::test]
async fn escrow_with_other_terms_blocks_initialize() {
    let ledger = ledger();
    let (a, b) = (WalletKeypair::generate().pubkey(), WalletKeypair::generate().pubkey());
    let m1 = ledger.mint_nft(&a, "M1");
    let m2 = ledger.mint_nft(&b, "M2");
    let m3 = ledger.mint_nft(&b, "M3");
    let client = ledger.client(a);

    let old = agreement(&a, &b, &[m1.clone()], &[m2]);
    job(SettlementOp::Initialize, &old, true)
        .run(&client)
        .await
        .result
        .unwrap();

    let new = agreement(&a, &b, &[m1], &[m3]);
    let outcome = job(SettlementOp::Initialize, &new, true).run(&client).await;
    assert_eq!(outcome.result, Err(SettlementError::StaleEscrow));
}

#[tokio::test]
async fn taker_deposit_after_expiry_fails() {
    let ledger = ledger();
    let (a, b) = (WalletKeypair::generate().pubkey(), WalletKeypair::generate().pubkey());
    let m1 = ledger.mint_nft(&a, "M1");
    let m2 = ledger.mint_nft(&b, "M2");
    let deal = agreement(&a, &b, &[m1], &[m2]);

    let init = job(SettlementOp::Initialize, &deal, true)
        .run(&ledger.client(a))
        .await
        .result
        .unwrap();
    let snapshot = init.snapshot.expect("snapshot after initialize");
    assert!(!snapshot.is_expired(ledger.now()));

    ledger.advance_clock(chrono::Duration::seconds(snapshot.timeout_secs + 1));
    assert!(snapshot.is_expired(ledger.now()));

    let taker_view = EscrowAgreement {
        local_role: SwapRole::Taker,
        ..deal
    };
    let deposit = job(SettlementOp::Deposit, &taker_view, false)
        .run(&ledger.client(b))
        .await;
    assert!(matches!(
        deposit.result,
        Err(SettlementError::Rpc { op: SettlementOp::Deposit, .. })
    ));
}
