//! Prometheus metrics for the lottery service

use crate::errors::LotteryResult;
use crate::lottery::Amount;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct LotteryMetrics {
    registry: Registry,
    tickets_sold: IntCounter,
    numbers_drawn: IntCounter,
    tickets_paid: IntCounter,
    amount_paid_out: IntCounter,
    withdrawals: IntCounter,
    transfer_failures: IntCounter,
    rejections: IntCounterVec,
    pool: IntGauge,
    round: IntGauge,
}

impl LotteryMetrics {
    pub fn new() -> LotteryResult<Self> {
        let registry = Registry::new_custom(Some("lotto".to_string()), None)?;

        let tickets_sold = IntCounter::new("tickets_sold_total", "Tickets sold across all rounds")?;
        let numbers_drawn = IntCounter::new("numbers_drawn_total", "Official numbers accepted")?;
        let tickets_paid = IntCounter::new("tickets_paid_total", "Tickets settled")?;
        let amount_paid_out = IntCounter::new("amount_paid_out_total", "Prize amount credited to balances")?;
        let withdrawals = IntCounter::new("withdrawals_total", "Successful withdrawals")?;
        let transfer_failures = IntCounter::new("transfer_failures_total", "Withdrawals re-credited after a failed transfer")?;
        let rejections = IntCounterVec::new(
            Opts::new("rejections_total", "Rejected operations by error code"),
            &["code"],
        )?;
        let pool = IntGauge::new("round_pool", "Aggregate paid in for the live round")?;
        let round = IntGauge::new("round_number", "Live round number")?;

        registry.register(Box::new(tickets_sold.clone()))?;
        registry.register(Box::new(numbers_drawn.clone()))?;
        registry.register(Box::new(tickets_paid.clone()))?;
        registry.register(Box::new(amount_paid_out.clone()))?;
        registry.register(Box::new(withdrawals.clone()))?;
        registry.register(Box::new(transfer_failures.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(pool.clone()))?;
        registry.register(Box::new(round.clone()))?;

        Ok(Self {
            registry,
            tickets_sold,
            numbers_drawn,
            tickets_paid,
            amount_paid_out,
            withdrawals,
            transfer_failures,
            rejections,
            pool,
            round,
        })
    }

    pub fn record_ticket_sold(&self, pool: Amount) {
        self.tickets_sold.inc();
        self.pool.set(gauge_value(pool));
    }

    pub fn record_number_drawn(&self) {
        self.numbers_drawn.inc();
    }

    pub fn record_ticket_paid(&self, amount: Amount) {
        self.tickets_paid.inc();
        self.amount_paid_out.inc_by(amount);
    }

    pub fn record_withdrawal(&self) {
        self.withdrawals.inc();
    }

    pub fn record_transfer_failure(&self) {
        self.transfer_failures.inc();
    }

    pub fn record_rejection(&self, code: &str) {
        self.rejections.with_label_values(&[code]).inc();
    }

    pub fn set_round(&self, round: u64, pool: Amount) {
        self.round.set(gauge_value(round));
        self.pool.set(gauge_value(pool));
    }

    pub fn rejection_count(&self, code: &str) -> u64 {
        self.rejections.with_label_values(&[code]).get()
    }

    pub fn tickets_sold(&self) -> u64 {
        self.tickets_sold.get()
    }

    /// Text exposition format
    pub fn render(&self) -> LotteryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::errors::LotteryError::Monitoring(e.to_string()))
    }
}

fn gauge_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_render() {
        let metrics = LotteryMetrics::new().unwrap();
        metrics.record_ticket_sold(100);
        metrics.record_ticket_sold(200);
        metrics.record_rejection("WRONG_PRICE");
        metrics.record_ticket_paid(50);

        assert_eq!(metrics.tickets_sold(), 2);
        assert_eq!(metrics.rejection_count("WRONG_PRICE"), 1);
        assert_eq!(metrics.rejection_count("ALREADY_PAID"), 0);

        let text = metrics.render().unwrap();
        assert!(text.contains("lotto_tickets_sold_total 2"));
        assert!(text.contains("lotto_round_pool 200"));
        assert!(text.contains("code=\"WRONG_PRICE\""));
    }

    #[test]
    fn test_independent_registries() {
        let a = LotteryMetrics::new().unwrap();
        let b = LotteryMetrics::new().unwrap();
        a.record_ticket_sold(1);
        assert_eq!(b.tickets_sold(), 0);
    }
}
