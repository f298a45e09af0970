//! Async lottery service
//!
//! Wraps [`LotteryEngine`] in one global lock so every mutation runs to
//! completion before the next starts. Collaborator calls (random draw source,
//! funds transfer) happen with the lock released; the engine state they depend
//! on is reserved first and reconciled when they report back.

use crate::common::traits::{FundsTransfer, RandomDrawSource};
use crate::config::LotteryConfig;
use crate::engine::{EngineCheckpoint, EngineSnapshot, LotteryEngine, Payout, RoundSummary, SettlementSummary};
use crate::errors::{LotteryError, LotteryResult};
use crate::lottery::{
    AccountId, Amount, DrawRequest, DrawState, PrizeTable, Selection, Ticket, TicketId, TierStatistics,
    NUMBERS_PER_TICKET,
};
use crate::metrics::LotteryMetrics;
use crate::round_store::{ChangeSet, RoundStore};
use crate::storage::LotteryStorage;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub struct LotteryService {
    engine: Arc<Mutex<LotteryEngine>>,
    draw_source: Arc<dyn RandomDrawSource>,
    transfer: Arc<dyn FundsTransfer>,
    store: Option<RoundStore>,
    metrics: Option<LotteryMetrics>,
    max_draw_attempts: u32,
}

impl LotteryService {
    /// Build the service, resuming the persisted round when storage is enabled
    pub fn open(
        config: &LotteryConfig,
        draw_source: Arc<dyn RandomDrawSource>,
        transfer: Arc<dyn FundsTransfer>,
    ) -> LotteryResult<Self> {
        config.validate()?;

        let store = if config.storage.enabled {
            Some(RoundStore::new(LotteryStorage::new_with_config(&config.storage)?))
        } else {
            None
        };

        let engine = match &store {
            Some(store) => match store.load_snapshot()? {
                Some(snapshot) => LotteryEngine::restore(config, snapshot)?,
                None => {
                    let engine = LotteryEngine::new(config)?;
                    store.save_snapshot(&engine.snapshot())?;
                    engine
                }
            },
            None => LotteryEngine::new(config)?,
        };

        let metrics = if config.monitoring.enable_metrics {
            let metrics = LotteryMetrics::new()?;
            metrics.set_round(engine.round().number, engine.round().paid_in);
            Some(metrics)
        } else {
            None
        };

        info!(
            round = engine.round().number,
            state = %engine.round().state(),
            persistent = store.is_some(),
            "Lottery service ready"
        );

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            draw_source,
            transfer,
            store,
            metrics,
            max_draw_attempts: config.draw.max_attempts,
        })
    }

    pub fn metrics(&self) -> Option<&LotteryMetrics> {
        self.metrics.as_ref()
    }

    pub fn store(&self) -> Option<&RoundStore> {
        self.store.as_ref()
    }

    fn reject(&self, op: &'static str, err: LotteryError) -> LotteryError {
        warn!(op, code = err.code(), error = %err, "Operation rejected");
        if let Some(metrics) = &self.metrics {
            metrics.record_rejection(err.code());
        }
        err
    }

    fn persist(&self, engine: &LotteryEngine, changes: &ChangeSet) -> LotteryResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.save_changes(engine, changes).map_err(|e| {
            error!(round = engine.round().number, error = %e, "Failed to persist round changes");
            e
        })
    }

    /// Persist `changes`, or put the engine back to `checkpoint` when the write fails
    fn commit(
        &self,
        op: &'static str,
        engine: &mut LotteryEngine,
        checkpoint: EngineCheckpoint,
        changes: &ChangeSet,
    ) -> LotteryResult<()> {
        if let Err(e) = self.persist(engine, changes) {
            engine.rollback(checkpoint);
            warn!(op, round = engine.round().number, "Mutation rolled back after failed write");
            return Err(self.reject(op, e));
        }
        Ok(())
    }

    // ----- Tickets -----

    pub async fn purchase(&self, numbers: &[u8], payment: Amount, buyer: AccountId) -> LotteryResult<TicketId> {
        let mut engine = self.engine.lock().await;
        let checkpoint = engine.checkpoint(&[], &[]);
        let id = engine
            .purchase(numbers, payment, buyer)
            .map_err(|e| self.reject("purchase", e))?;
        self.commit("purchase", &mut engine, checkpoint, &ChangeSet::new().ticket(id))?;

        if let Some(metrics) = &self.metrics {
            metrics.record_ticket_sold(engine.round().paid_in);
        }
        Ok(id)
    }

    /// Buy a ticket with randomly chosen numbers
    pub async fn purchase_quick_pick(&self, payment: Amount, buyer: AccountId) -> LotteryResult<TicketId> {
        let selection = Selection::quick_pick(&mut rand::thread_rng());
        self.purchase(selection.numbers(), payment, buyer).await
    }

    pub async fn get_ticket_numbers(&self, id: TicketId) -> LotteryResult<[u8; NUMBERS_PER_TICKET]> {
        self.engine.lock().await.get_ticket_numbers(id)
    }

    pub async fn ticket(&self, id: TicketId) -> LotteryResult<Ticket> {
        self.engine.lock().await.ticket(id).cloned()
    }

    pub async fn is_paid(&self, id: TicketId) -> LotteryResult<bool> {
        self.engine.lock().await.is_paid(id)
    }

    // ----- Draw -----

    pub async fn close_sales(&self, caller: &AccountId) -> LotteryResult<()> {
        let mut engine = self.engine.lock().await;
        let checkpoint = engine.checkpoint(&[], &[]);
        engine
            .ensure_operator(caller)
            .and_then(|_| engine.close_sales())
            .map_err(|e| self.reject("close_sales", e))?;
        self.commit("close_sales", &mut engine, checkpoint, &ChangeSet::new())
    }

    /// Append one official number directly (trusted operator path)
    pub async fn submit_drawn_number(&self, caller: &AccountId, value: u8) -> LotteryResult<DrawState> {
        let mut engine = self.engine.lock().await;
        let checkpoint = engine.checkpoint(&[], &[]);
        let state = engine
            .ensure_operator(caller)
            .and_then(|_| engine.submit_drawn_number(value))
            .map_err(|e| self.reject("submit_drawn_number", e))?;
        self.commit("submit_drawn_number", &mut engine, checkpoint, &ChangeSet::new())?;

        if let Some(metrics) = &self.metrics {
            metrics.record_number_drawn();
        }
        Ok(state)
    }

    /// Ask the random draw source for one number and apply it
    pub async fn draw_next_number(&self) -> LotteryResult<DrawState> {
        let request = {
            let mut engine = self.engine.lock().await;
            let checkpoint = engine.checkpoint(&[], &[]);
            let request = engine
                .request_draw_number()
                .map_err(|e| self.reject("draw_next_number", e))?;
            self.commit("draw_next_number", &mut engine, checkpoint, &ChangeSet::new())?;
            request
        };

        let response = self.draw_source.draw_number(&request).await;

        let mut engine = self.engine.lock().await;
        let checkpoint = engine.checkpoint(&[], &[]);
        let value = match response {
            Ok(value) => value,
            Err(e) => {
                // Retire the request so the draw can be retried
                if engine.outstanding_draw_request().map(|r| r.token) == Some(request.token) {
                    engine.cancel_draw_request();
                    self.commit("draw_next_number", &mut engine, checkpoint, &ChangeSet::new())?;
                }
                return Err(self.reject("draw_next_number", e.into()));
            }
        };

        let result = engine.fulfil_draw_request(request.token, value);
        // A rejected value still retires the request, so persist either way
        self.commit("draw_next_number", &mut engine, checkpoint, &ChangeSet::new())?;
        let state = result.map_err(|e| self.reject("draw_next_number", e))?;

        if let Some(metrics) = &self.metrics {
            metrics.record_number_drawn();
        }
        Ok(state)
    }

    /// Keep drawing until all seven numbers are in, retrying rejected values
    pub async fn complete_draw(&self) -> LotteryResult<Vec<u8>> {
        for attempt in 1..=self.max_draw_attempts {
            match self.draw_next_number().await {
                Ok(DrawState::Complete) => return Ok(self.official_numbers().await),
                Ok(_) => {}
                Err(LotteryError::DuplicateDraw(value)) | Err(LotteryError::OutOfRange(value)) => {
                    warn!(attempt, value, "Draw source value rejected, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(self.reject(
            "complete_draw",
            LotteryError::DrawSourceFailed(format!(
                "draw incomplete after {} attempts",
                self.max_draw_attempts
            )),
        ))
    }

    /// Operator recovery for a request the source never answered
    pub async fn cancel_draw_request(&self, caller: &AccountId) -> LotteryResult<Option<DrawRequest>> {
        let mut engine = self.engine.lock().await;
        engine
            .ensure_operator(caller)
            .map_err(|e| self.reject("cancel_draw_request", e))?;
        let checkpoint = engine.checkpoint(&[], &[]);
        let cancelled = engine.cancel_draw_request();
        self.commit("cancel_draw_request", &mut engine, checkpoint, &ChangeSet::new())?;
        Ok(cancelled)
    }

    pub async fn official_numbers(&self) -> Vec<u8> {
        self.engine.lock().await.official_numbers().to_vec()
    }

    pub async fn draw_state(&self) -> DrawState {
        self.engine.lock().await.draw_state()
    }

    // ----- Tiers and prizes -----

    pub async fn tally_tier_statistics(&self) -> LotteryResult<TierStatistics> {
        self.engine.lock().await.tally_tier_statistics()
    }

    pub async fn import_tier_statistics(&self, caller: &AccountId, counts: &[u64]) -> LotteryResult<PrizeTable> {
        let mut engine = self.engine.lock().await;
        let checkpoint = engine.checkpoint(&[], &[]);
        let table = engine
            .ensure_operator(caller)
            .and_then(|_| engine.import_tier_statistics(counts).copied())
            .map_err(|e| self.reject("import_tier_statistics", e))?;
        self.commit("import_tier_statistics", &mut engine, checkpoint, &ChangeSet::new())?;
        Ok(table)
    }

    pub async fn get_tier_count(&self, tier: usize) -> LotteryResult<u64> {
        self.engine.lock().await.tier_count(tier)
    }

    pub async fn get_tier_payout(&self, tier: usize) -> LotteryResult<Amount> {
        self.engine.lock().await.tier_payout(tier)
    }

    pub async fn prize_table(&self) -> Option<PrizeTable> {
        self.engine.lock().await.prize_table().copied()
    }

    // ----- Settlement -----

    pub async fn payout_ticket(&self, id: TicketId) -> LotteryResult<Payout> {
        let mut engine = self.engine.lock().await;
        let owner: Vec<AccountId> = engine.ticket(id).map(|t| vec![t.owner.clone()]).unwrap_or_default();
        let checkpoint = engine.checkpoint(&[id], &owner);
        let payout = engine
            .payout_ticket(id)
            .map_err(|e| self.reject("payout_ticket", e))?;
        let changes = ChangeSet::new().ticket(id).account(payout.owner.clone());
        self.commit("payout_ticket", &mut engine, checkpoint, &changes)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_ticket_paid(payout.amount);
        }
        Ok(payout)
    }

    pub async fn payout_all_unpaid(&self) -> LotteryResult<SettlementSummary> {
        let mut engine = self.engine.lock().await;
        let checkpoint = engine.checkpoint_unpaid();
        let summary = engine
            .payout_all_unpaid()
            .map_err(|e| self.reject("payout_all_unpaid", e))?;

        let changes = summary.payouts.iter().fold(ChangeSet::new(), |changes, payout| {
            changes.ticket(payout.ticket_id).account(payout.owner.clone())
        });
        self.commit("payout_all_unpaid", &mut engine, checkpoint, &changes)?;

        if let Some(metrics) = &self.metrics {
            for payout in &summary.payouts {
                metrics.record_ticket_paid(payout.amount);
            }
        }
        Ok(summary)
    }

    pub async fn balance_of(&self, account: &AccountId) -> Amount {
        self.engine.lock().await.balance_of(account)
    }

    /// Pay out the account's whole balance. Returns 0 when there is nothing to pay.
    pub async fn withdraw(&self, account: &AccountId) -> LotteryResult<Amount> {
        let amount = {
            let mut engine = self.engine.lock().await;
            let checkpoint = engine.checkpoint(&[], std::slice::from_ref(account));
            let amount = engine.begin_withdrawal(account);
            if amount == 0 {
                return Ok(0);
            }
            self.commit("withdraw", &mut engine, checkpoint, &ChangeSet::new().account(account.clone()))?;
            amount
        };

        match self.transfer.transfer(account, amount).await {
            Ok(receipt) => {
                info!(account = %account, amount, transfer_id = %receipt.transfer_id, "Withdrawal paid");
                if let Some(metrics) = &self.metrics {
                    metrics.record_withdrawal();
                }
                Ok(amount)
            }
            Err(e) => {
                let mut engine = self.engine.lock().await;
                engine.abort_withdrawal(account, amount)?;
                // No funds moved, so the re-credit stands even if this write fails
                let _ = self.persist(&engine, &ChangeSet::new().account(account.clone()));
                if let Some(metrics) = &self.metrics {
                    metrics.record_transfer_failure();
                }
                Err(self.reject("withdraw", e.into()))
            }
        }
    }

    /// Transfer the round's operator cut to the operator account, once per round
    pub async fn withdraw_operator_cut(&self, caller: &AccountId) -> LotteryResult<Amount> {
        let (amount, operator) = {
            let mut engine = self.engine.lock().await;
            let checkpoint = engine.checkpoint(&[], &[]);
            let amount = engine
                .begin_operator_cut_withdrawal(caller)
                .map_err(|e| self.reject("withdraw_operator_cut", e))?;
            self.commit("withdraw_operator_cut", &mut engine, checkpoint, &ChangeSet::new())?;
            (amount, engine.operator_account().clone())
        };

        if amount > 0 {
            if let Err(e) = self.transfer.transfer(&operator, amount).await {
                let mut engine = self.engine.lock().await;
                engine.abort_operator_cut_withdrawal();
                let _ = self.persist(&engine, &ChangeSet::new());
                if let Some(metrics) = &self.metrics {
                    metrics.record_transfer_failure();
                }
                return Err(self.reject("withdraw_operator_cut", e.into()));
            }
        }

        let mut engine = self.engine.lock().await;
        engine.complete_operator_cut_withdrawal()?;
        // The cut has moved; a missed settling write is redone on restore
        let _ = self.persist(&engine, &ChangeSet::new());
        if let Some(metrics) = &self.metrics {
            metrics.record_withdrawal();
        }
        Ok(amount)
    }

    // ----- Rounds -----

    pub async fn start_next_round(&self, caller: &AccountId) -> LotteryResult<u64> {
        let mut engine = self.engine.lock().await;
        let checkpoint = engine.checkpoint_round();
        let round = engine
            .ensure_operator(caller)
            .and_then(|_| engine.start_next_round())
            .map_err(|e| self.reject("start_next_round", e))?;

        if let Some(store) = &self.store {
            if let Err(e) = store.save_snapshot(&engine.snapshot()) {
                error!(round, error = %e, "Failed to persist new round");
                engine.rollback(checkpoint);
                return Err(self.reject("start_next_round", e));
            }
        }

        self.draw_source.round_started(round);
        if let Some(metrics) = &self.metrics {
            metrics.set_round(round, 0);
        }
        Ok(round)
    }

    pub async fn round_summary(&self) -> RoundSummary {
        self.engine.lock().await.round_summary()
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.engine.lock().await.snapshot()
    }
}
