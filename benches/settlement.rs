use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use lotto_engine::{lottery::match_count, AccountId, LotteryConfig, LotteryEngine, Selection};
use rand::{rngs::StdRng, SeedableRng};

const OFFICIAL: [u8; 7] = [4, 11, 17, 22, 29, 33, 37];

fn engine_with_tickets(count: usize) -> LotteryEngine {
    let config = LotteryConfig::testing();
    let price = config.rules.ticket_price;
    let mut engine = LotteryEngine::new(&config).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let buyer = AccountId::new("bench");
    for _ in 0..count {
        let selection = Selection::quick_pick(&mut rng);
        engine.purchase(selection.numbers(), price, buyer.clone()).unwrap();
    }
    for v in OFFICIAL {
        engine.submit_drawn_number(v).unwrap();
    }
    engine
}

fn bench_match_count(c: &mut Criterion) {
    let engine = engine_with_tickets(1);
    let mut rng = StdRng::seed_from_u64(2);
    let tickets: Vec<Selection> = (0..1_000).map(|_| Selection::quick_pick(&mut rng)).collect();
    let official = lotto_engine::lottery::DrawResolver::restore(engine.official_numbers().to_vec(), None)
        .unwrap()
        .completed()
        .unwrap();

    c.bench_function("match_count_1k", |b| {
        b.iter(|| {
            tickets
                .iter()
                .map(|t| match_count(black_box(t), &official))
                .sum::<usize>()
        })
    });
}

fn bench_settle_round(c: &mut Criterion) {
    c.bench_function("tally_import_settle_10k", |b| {
        b.iter_batched(
            || engine_with_tickets(10_000),
            |mut engine| {
                let counts = engine.tally_tier_statistics().unwrap();
                engine.import_tier_statistics(counts.counts()).unwrap();
                black_box(engine.payout_all_unpaid().unwrap())
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_match_count, bench_settle_round);
criterion_main!(benches);
