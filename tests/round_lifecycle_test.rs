//! Full round: ten random tickets, seven drawn numbers, tier import, settlement

use lotto_engine::{
    lottery::{match_count, CompletedDraw, DrawResolver},
    AccountId, DrawState, LotteryConfig, LotteryEngine, LotteryError, RoundState,
    Selection, TicketId,
};
use rand::{rngs::StdRng, SeedableRng};

const OFFICIAL: [u8; 7] = [2, 9, 13, 20, 26, 31, 38];

fn players() -> Vec<AccountId> {
    ["alice", "bob", "carol"].iter().map(|n| AccountId::from(*n)).collect()
}

#[test]
fn test_ten_ticket_round() {
    let config = LotteryConfig::testing();
    let price = config.rules.ticket_price;
    let mut engine = LotteryEngine::new(&config).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let players = players();

    // Sales
    for i in 0..10u64 {
        let selection = Selection::quick_pick(&mut rng);
        let owner = players[(i % 3) as usize].clone();
        let id = engine.purchase(selection.numbers(), price, owner).unwrap();
        assert_eq!(id, TicketId(i + 1));
    }
    assert_eq!(engine.round().paid_in, 10 * price);

    // Draw
    for (i, value) in OFFICIAL.iter().enumerate() {
        let state = engine.submit_drawn_number(*value).unwrap();
        let expected = if i == 6 { DrawState::Complete } else { DrawState::Filling };
        assert_eq!(state, expected);
    }
    assert_eq!(engine.official_numbers(), &OFFICIAL);
    assert_eq!(engine.round().state(), RoundState::DrawComplete);

    // Tier import
    let counts = engine.tally_tier_statistics().unwrap();
    assert_eq!(counts.total(), Some(10));
    let table = *engine.import_tier_statistics(counts.counts()).unwrap();
    assert_eq!(engine.round().state(), RoundState::StatsImported);
    assert!(table.operator_cut() >= 10 * price * 5 / 100);

    // Settlement
    let mut paid = 0;
    for id in 1..=10 {
        let ticket = engine.ticket(TicketId(id)).unwrap().clone();
        let official = engine.tally_tier_statistics().unwrap();
        let payout = engine.payout_ticket(TicketId(id)).unwrap();

        assert_eq!(payout.owner, ticket.owner);
        assert_eq!(payout.amount, engine.tier_payout(payout.tier).unwrap());
        assert!(official.count(payout.tier).unwrap() > 0);
        paid += payout.amount;
    }
    assert!(paid + table.operator_cut() <= 10 * price);
    assert_eq!(paid + table.operator_cut(), 10 * price);

    let total_balances: u64 = players.iter().map(|p| engine.balance_of(p)).sum();
    assert_eq!(total_balances, paid);

    // Close out
    let operator = AccountId::from("operator");
    engine.begin_operator_cut_withdrawal(&operator).unwrap();
    engine.complete_operator_cut_withdrawal().unwrap();
    assert_eq!(engine.round().state(), RoundState::Settled);
    assert_eq!(engine.start_next_round().unwrap(), 2);
}

/// Treat a ticket's numbers as if they had been the official draw
fn as_draw(selection: &Selection) -> CompletedDraw {
    DrawResolver::restore(selection.numbers().to_vec(), None)
        .unwrap()
        .completed()
        .unwrap()
}

#[test]
fn test_match_count_properties() {
    let mut rng = StdRng::seed_from_u64(99);

    let draw = Selection::new(&OFFICIAL).unwrap();
    for _ in 0..200 {
        let a = Selection::quick_pick(&mut rng);
        let b = Selection::quick_pick(&mut rng);
        let ab = match_count(&a, &as_draw(&b));
        let ba = match_count(&b, &as_draw(&a));
        assert_eq!(ab, ba);
        assert!(ab <= 7);
        assert_eq!(match_count(&a, &as_draw(&a)), 7);
    }

    let completed = as_draw(&draw);
    assert_eq!(match_count(&draw, &completed), 7);
    let disjoint = Selection::new(&[1, 3, 4, 5, 6, 7, 8]).unwrap();
    assert_eq!(match_count(&disjoint, &completed), 0);
}

#[test]
fn test_rejections_leave_state_untouched() {
    let config = LotteryConfig::testing();
    let price = config.rules.ticket_price;
    let mut engine = LotteryEngine::new(&config).unwrap();
    let alice = AccountId::from("alice");

    assert!(matches!(
        engine.purchase(&[1, 2, 3, 4, 5, 6], price, alice.clone()),
        Err(LotteryError::InvalidSelection(_))
    ));
    assert!(matches!(
        engine.purchase(&[1, 2, 3, 4, 5, 6, 6], price, alice.clone()),
        Err(LotteryError::InvalidSelection(_))
    ));
    assert!(matches!(
        engine.purchase(&[1, 2, 3, 4, 5, 6, 40], price, alice.clone()),
        Err(LotteryError::InvalidSelection(_))
    ));
    assert!(matches!(
        engine.purchase(&[1, 2, 3, 4, 5, 6, 7], price - 1, alice.clone()),
        Err(LotteryError::WrongPrice { .. })
    ));
    assert_eq!(engine.round_summary().tickets_sold, 0);
    assert_eq!(engine.round().paid_in, 0);

    assert_eq!(engine.purchase(&[1, 2, 3, 4, 5, 6, 7], price, alice).unwrap(), TicketId(1));

    engine.submit_drawn_number(4).unwrap();
    assert!(matches!(engine.submit_drawn_number(4), Err(LotteryError::DuplicateDraw(4))));
    assert!(matches!(engine.submit_drawn_number(40), Err(LotteryError::OutOfRange(40))));
    assert_eq!(engine.official_numbers(), &[4]);
    assert!(matches!(engine.payout_ticket(TicketId(1)), Err(LotteryError::DrawNotFinalized(_))));
}
