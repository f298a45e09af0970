//! Verify lottery state survives stopping and restarting the service

use lotto_engine::{
    AccountId, InMemoryFundsTransfer, LotteryConfig, LotteryError, LotteryService, RoundState, TicketId,
    VrfDrawSource,
};
use std::sync::Arc;
use tempfile::TempDir;

fn persistent_config(dir: &TempDir) -> LotteryConfig {
    let mut config = LotteryConfig::testing();
    config.storage.enabled = true;
    config.storage.clear_on_start = false;
    config.storage.data_directory = dir.path().join("lottery_db").to_string_lossy().to_string();
    config
}

fn open(config: &LotteryConfig) -> LotteryService {
    LotteryService::open(
        config,
        Arc::new(VrfDrawSource::from_seed(&[42u8; 32]).expect("seeded source")),
        Arc::new(InMemoryFundsTransfer::new()),
    )
    .expect("Failed to open lottery service")
}

#[tokio::test]
async fn test_round_persists_across_restarts() {
    let dir = TempDir::new().unwrap();
    let config = persistent_config(&dir);
    let operator = AccountId::new("operator");
    let alice = AccountId::new("alice");

    // === PHASE 1: sell, draw, import, pay one ticket ===
    let (numbers, paid_amount) = {
        let service = open(&config);
        for _ in 0..5 {
            service.purchase_quick_pick(1_000, alice.clone()).await.unwrap();
        }
        let numbers = service.complete_draw().await.unwrap();
        let counts = service.tally_tier_statistics().await.unwrap();
        service.import_tier_statistics(&operator, counts.counts()).await.unwrap();
        let payout = service.payout_ticket(TicketId(2)).await.unwrap();
        (numbers, payout.amount)
    };

    // === PHASE 2: reopen and check nothing was lost ===
    let service = open(&config);
    let summary = service.round_summary().await;
    assert_eq!(summary.round, 1);
    assert_eq!(summary.state, RoundState::StatsImported);
    assert_eq!(summary.tickets_sold, 5);
    assert_eq!(summary.paid_in, 5_000);
    assert_eq!(summary.official_numbers, numbers);
    assert_eq!(summary.tickets_paid_out, 1);
    assert_eq!(service.balance_of(&alice).await, paid_amount);

    // Exactly-once holds across the restart
    assert!(matches!(
        service.payout_ticket(TicketId(2)).await,
        Err(LotteryError::AlreadyPaid(TicketId(2)))
    ));
    assert!(matches!(
        service.import_tier_statistics(&operator, &[0, 0, 0, 0, 0, 0, 0, 5]).await,
        Err(LotteryError::StatsAlreadyImported(1))
    ));

    service.payout_all_unpaid().await.unwrap();
    service.withdraw_operator_cut(&operator).await.unwrap();
    assert_eq!(service.round_summary().await.state, RoundState::Settled);
}

#[tokio::test]
async fn test_next_round_persists_and_keeps_history() {
    let dir = TempDir::new().unwrap();
    let config = persistent_config(&dir);
    let operator = AccountId::new("operator");
    let bob = AccountId::new("bob");

    {
        let service = open(&config);
        service.purchase(&[1, 2, 3, 4, 5, 6, 7], 1_000, bob.clone()).await.unwrap();
        service.complete_draw().await.unwrap();
        let counts = service.tally_tier_statistics().await.unwrap();
        service.import_tier_statistics(&operator, counts.counts()).await.unwrap();
        service.payout_all_unpaid().await.unwrap();
        service.withdraw_operator_cut(&operator).await.unwrap();
        assert_eq!(service.start_next_round(&operator).await.unwrap(), 2);
        service.purchase(&[8, 9, 10, 11, 12, 13, 14], 1_000, bob.clone()).await.unwrap();
    }

    let service = open(&config);
    let summary = service.round_summary().await;
    assert_eq!(summary.round, 2);
    assert_eq!(summary.state, RoundState::Open);
    assert_eq!(summary.tickets_sold, 1);
    assert_eq!(
        service.get_ticket_numbers(TicketId(1)).await.unwrap(),
        [8, 9, 10, 11, 12, 13, 14]
    );

    let store = service.store().expect("storage enabled");
    let first = store.load_round(1).unwrap().expect("round 1 kept");
    assert_eq!(first.state(), RoundState::Settled);
    assert_eq!(store.load_round_tickets(1).unwrap().len(), 1);
}

#[tokio::test]
async fn test_clear_on_start_discards_state() {
    let dir = TempDir::new().unwrap();
    let mut config = persistent_config(&dir);

    {
        let service = open(&config);
        service
            .purchase(&[1, 2, 3, 4, 5, 6, 7], 1_000, AccountId::new("carol"))
            .await
            .unwrap();
    }

    config.storage.clear_on_start = true;
    let service = open(&config);
    assert_eq!(service.round_summary().await.tickets_sold, 0);
}
