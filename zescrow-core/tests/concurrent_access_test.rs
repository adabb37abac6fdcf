//! Concurrent access tests
//!
//! Several callers racing the same deal must produce exactly one transition
//! and exactly one payout.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

use rust_decimal::Decimal;
use tempfile::TempDir;

use zescrow_core::adapters::duckdb::DuckDbRepository;
use zescrow_core::domain::{Blockchain, DealStatus, Pool, TxType};
use zescrow_core::services::{CreateDeal, SubmitWork};
use zescrow_core::{Error, EscrowContext};

/// Number of concurrent callers
const THREAD_COUNT: usize = 6;

fn funded_context(temp_dir: &TempDir, clients: usize) -> EscrowContext {
    let ctx = EscrowContext::new(temp_dir.path()).unwrap();
    ctx.escrow_service.create_user_wallet("freelancer01", None).unwrap();
    for i in 0..clients {
        let client_id = format!("client{:04}", i);
        ctx.escrow_service.create_user_wallet(&client_id, None).unwrap();
        ctx.escrow_service
            .fund_wallet(&client_id, Decimal::new(5, 0), Pool::Shielded)
            .unwrap();
    }
    ctx
}

fn deal_request(client_id: &str) -> CreateDeal {
    CreateDeal {
        client_id: client_id.to_string(),
        freelancer_id: "freelancer01".to_string(),
        amount_zec: Decimal::new(1, 0),
        deadline_days: 3,
        description: "Translate the README".to_string(),
    }
}

/// Test: every thread tries to approve the same submitted deal.
///
/// The compare-and-set claim lets one through; the rest see either a
/// conflict (lost the claim) or an invalid transition (read after it).
#[test]
fn test_racing_approvals_release_once() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = Arc::new(funded_context(&temp_dir, 1));

    let deal = ctx.escrow_service.create_deal(deal_request("client0000")).unwrap();
    ctx.escrow_service
        .submit_work(
            &deal.deal_id,
            "freelancer01",
            SubmitWork {
                proof_link: "https://example.com/readme".to_string(),
                notes: None,
            },
        )
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let winners = Arc::new(AtomicUsize::new(0));
    let losers = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|thread_id| {
            let ctx = Arc::clone(&ctx);
            let barrier = Arc::clone(&barrier);
            let winners = Arc::clone(&winners);
            let losers = Arc::clone(&losers);
            let deal_id = deal.deal_id.clone();

            thread::spawn(move || {
                barrier.wait();
                match ctx.escrow_service.approve_work(&deal_id, "client0000") {
                    Ok(deal) => {
                        assert_eq!(deal.status, DealStatus::Approved);
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(Error::Conflict(_)) | Err(Error::InvalidTransition { .. }) => {
                        losers.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => panic!("Thread {}: unexpected error: {:?}", thread_id, e),
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(losers.load(Ordering::SeqCst), THREAD_COUNT - 1);

    let releases: Vec<_> = ctx
        .escrow_service
        .get_deal_transactions(&deal.deal_id)
        .unwrap()
        .into_iter()
        .filter(|t| t.blockchain == Blockchain::Zcash && t.tx_type == TxType::Release)
        .collect();
    assert_eq!(releases.len(), 1, "exactly one payout leaves the vault");
    assert_eq!(
        ctx.escrow_service.get_wallet("freelancer01").unwrap().balance.total(),
        100_000_000 - 1_000
    );
}

/// Test: independent clients funding deals at the same time all succeed
/// and the vault ends up holding every escrowed amount.
#[test]
fn test_concurrent_deal_creation() {
    let temp_dir = TempDir::new().unwrap();
    let ctx = Arc::new(funded_context(&temp_dir, THREAD_COUNT));
    let barrier = Arc::new(Barrier::new(THREAD_COUNT));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|i| {
            let ctx = Arc::clone(&ctx);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let start = Instant::now();
                let deal = ctx
                    .escrow_service
                    .create_deal(deal_request(&format!("client{:04}", i)))
                    .unwrap();
                println!("Thread {}: created {} in {:?}", i, deal.deal_id, start.elapsed());
                deal.deal_id
            })
        })
        .collect();

    let mut deal_ids: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();
    deal_ids.sort();
    deal_ids.dedup();
    assert_eq!(deal_ids.len(), THREAD_COUNT, "deal ids are unique");

    let status = ctx.status_service.get_status().unwrap();
    assert_eq!(status.total_deals, THREAD_COUNT as i64);
    assert_eq!(status.escrowed_zatoshi, THREAD_COUNT as i64 * 100_000_000);
    assert_eq!(status.pending_transactions, THREAD_COUNT as i64);

    let vault = ctx.vault.vault_wallet();
    assert_eq!(
        ctx.zcash.balance(&vault.wallet_id).unwrap().total(),
        THREAD_COUNT as i64 * 100_000_000
    );
}

/// Test: the database file can be reopened repeatedly without losing data.
#[test]
fn test_sequential_reopen_keeps_schema() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("zescrow.duckdb");

    for i in 0..5 {
        let start = Instant::now();
        let repo = DuckDbRepository::new(&db_path).unwrap();
        repo.ensure_schema().unwrap();
        assert_eq!(repo.list_deals(None, 10).unwrap().len(), 0);
        println!("Connection {}: opened in {:?}", i, start.elapsed());
    }
}
