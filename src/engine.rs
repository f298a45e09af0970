//! Lottery engine: the single-writer state machine for one live round
//!
//! Every mutating method validates fully before it touches state, so a
//! rejected call leaves the engine exactly as it was. Callers serialize access
//! (see [`crate::service::LotteryService`]); the engine itself holds no locks.

use crate::config::{LotteryConfig, PrizeConfig, RulesConfig};
use crate::errors::{LotteryError, LotteryResult, StorageError};
use crate::lottery::{
    match_count, AccountId, Amount, CompletedDraw, DrawRequest, DrawResolver, DrawState, PrizeTable,
    Round, RoundState, SettlementLedger, Ticket, TicketId, TicketRegistry, TierStatistics,
    NUMBERS_PER_TICKET, TIER_COUNT,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Result of settling one ticket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payout {
    pub ticket_id: TicketId,
    pub owner: AccountId,
    pub tier: usize,
    pub amount: Amount,
}

/// Result of settling every outstanding ticket at once
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub round: u64,
    pub payouts: Vec<Payout>,
    pub total_amount: Amount,
}

/// Read-only overview of the live round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u64,
    pub state: RoundState,
    pub tickets_sold: u64,
    pub paid_in: Amount,
    pub tickets_paid_out: u64,
    pub official_numbers: Vec<u8>,
    pub draw_state: DrawState,
    pub operator_cut_withdrawn: bool,
}

/// Everything needed to rebuild an engine for the live round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub round: Round,
    pub tickets: Vec<Ticket>,
    pub draw_numbers: Vec<u8>,
    pub outstanding_request: Option<DrawRequest>,
    pub tier_statistics: Option<TierStatistics>,
    pub prize_table: Option<PrizeTable>,
    pub balances: Vec<(AccountId, Amount)>,
}

/// Engine state captured ahead of a mutation, so the mutation can be undone
/// when its records fail to reach storage.
///
/// Only the tickets and accounts named at capture time are saved; a rollback
/// restores those plus the round header, draw and prize data, and drops any
/// ticket sold after the capture.
#[derive(Debug, Clone)]
pub struct EngineCheckpoint {
    round: Round,
    draw: DrawResolver,
    tier_statistics: Option<TierStatistics>,
    prize_table: Option<PrizeTable>,
    operator_cut_in_flight: bool,
    tickets_sold: usize,
    tickets: Vec<Ticket>,
    balances: Vec<(AccountId, Amount)>,
    registry: Option<TicketRegistry>,
}

pub struct LotteryEngine {
    rules: RulesConfig,
    prizes: PrizeConfig,
    round: Round,
    registry: TicketRegistry,
    draw: DrawResolver,
    tier_statistics: Option<TierStatistics>,
    prize_table: Option<PrizeTable>,
    ledger: SettlementLedger,
    /// Operator cut taken for a transfer that has not reported back yet
    operator_cut_in_flight: bool,
}

impl LotteryEngine {
    /// Create an engine with round 1 open for sales
    pub fn new(config: &LotteryConfig) -> LotteryResult<Self> {
        config.validate()?;
        info!(
            ticket_price = config.rules.ticket_price,
            operator = %config.rules.operator_account,
            "Lottery engine initialized, round 1 open"
        );
        Ok(Self {
            rules: config.rules.clone(),
            prizes: config.prizes.clone(),
            round: Round::new(1),
            registry: TicketRegistry::new(),
            draw: DrawResolver::new(),
            tier_statistics: None,
            prize_table: None,
            ledger: SettlementLedger::new(),
            operator_cut_in_flight: false,
        })
    }

    /// Rebuild an engine from persisted state, re-checking the cross-record invariants
    pub fn restore(config: &LotteryConfig, snapshot: EngineSnapshot) -> LotteryResult<Self> {
        config.validate()?;

        let registry = TicketRegistry::from_tickets(snapshot.tickets)?;
        let draw = DrawResolver::restore(snapshot.draw_numbers, snapshot.outstanding_request)?;
        let round = snapshot.round;
        let state = round.state();

        let corrupted = |msg: String| LotteryError::Storage(StorageError::CorruptedData(msg));

        if registry.aggregate_paid() != round.paid_in {
            return Err(corrupted(format!(
                "round {} records {} paid in but tickets sum to {}",
                round.number,
                round.paid_in,
                registry.aggregate_paid()
            )));
        }
        if (state >= RoundState::DrawComplete) != draw.is_complete() {
            return Err(corrupted(format!(
                "round {} is {} but draw has {} numbers",
                round.number,
                state,
                draw.fill_count()
            )));
        }
        let finalized = state >= RoundState::StatsImported;
        if finalized != (snapshot.tier_statistics.is_some() && snapshot.prize_table.is_some()) {
            return Err(corrupted(format!(
                "round {} is {} but tier statistics presence does not match",
                round.number, state
            )));
        }

        info!(
            round = round.number,
            state = %state,
            tickets = registry.tickets_sold(),
            "Lottery engine restored"
        );

        let mut engine = Self {
            rules: config.rules.clone(),
            prizes: config.prizes.clone(),
            round,
            registry,
            draw,
            tier_statistics: snapshot.tier_statistics,
            prize_table: snapshot.prize_table,
            ledger: SettlementLedger::from_balances(snapshot.balances),
            operator_cut_in_flight: false,
        };
        // The settling write may not have landed after the last payout or cut
        engine.maybe_settle()?;
        Ok(engine)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            round: self.round.clone(),
            tickets: self.registry.tickets().to_vec(),
            draw_numbers: self.draw.official_numbers().to_vec(),
            outstanding_request: self.draw.outstanding_request().cloned(),
            tier_statistics: self.tier_statistics,
            prize_table: self.prize_table,
            balances: self
                .ledger
                .balances()
                .map(|(account, amount)| (account.clone(), amount))
                .collect(),
        }
    }

    /// Capture the round plus the named tickets and account balances
    pub fn checkpoint(&self, tickets: &[TicketId], accounts: &[AccountId]) -> EngineCheckpoint {
        EngineCheckpoint {
            round: self.round.clone(),
            draw: self.draw.clone(),
            tier_statistics: self.tier_statistics,
            prize_table: self.prize_table,
            operator_cut_in_flight: self.operator_cut_in_flight,
            tickets_sold: self.registry.tickets().len(),
            tickets: tickets
                .iter()
                .filter_map(|id| self.registry.lookup(*id).ok().cloned())
                .collect(),
            balances: accounts
                .iter()
                .map(|account| (account.clone(), self.ledger.balance_of(account)))
                .collect(),
            registry: None,
        }
    }

    /// Capture everything a round rollover replaces
    pub fn checkpoint_round(&self) -> EngineCheckpoint {
        EngineCheckpoint {
            registry: Some(self.registry.clone()),
            ..self.checkpoint(&[], &[])
        }
    }

    /// Capture everything a batch settlement can touch
    pub fn checkpoint_unpaid(&self) -> EngineCheckpoint {
        let (ids, owners): (Vec<TicketId>, Vec<AccountId>) = self.unpaid_tickets().into_iter().unzip();
        self.checkpoint(&ids, &owners)
    }

    /// Return to the state captured in `checkpoint`
    pub fn rollback(&mut self, checkpoint: EngineCheckpoint) {
        self.round = checkpoint.round;
        self.draw = checkpoint.draw;
        self.tier_statistics = checkpoint.tier_statistics;
        self.prize_table = checkpoint.prize_table;
        self.operator_cut_in_flight = checkpoint.operator_cut_in_flight;

        match checkpoint.registry {
            Some(registry) => self.registry = registry,
            None => {
                self.registry.truncate(checkpoint.tickets_sold);
                for ticket in checkpoint.tickets {
                    self.registry.replace(ticket);
                }
            }
        }
        for (account, amount) in &checkpoint.balances {
            self.ledger.set_balance(account, *amount);
        }

        debug!(round = self.round.number, state = %self.round.state(), "Engine rolled back to checkpoint");
    }

    // ----- Ticket Registry -----

    /// Sell one ticket for the live round
    pub fn purchase(&mut self, numbers: &[u8], payment: Amount, buyer: AccountId) -> LotteryResult<TicketId> {
        self.round.ensure_open()?;

        let id = self
            .registry
            .purchase(numbers, payment, self.rules.ticket_price, buyer)?;
        self.round.paid_in = self.registry.aggregate_paid();

        debug!(round = self.round.number, ticket = id.0, paid_in = self.round.paid_in, "Ticket sold");
        Ok(id)
    }

    pub fn get_ticket_numbers(&self, id: TicketId) -> LotteryResult<[u8; NUMBERS_PER_TICKET]> {
        Ok(*self.registry.lookup(id)?.selection.numbers())
    }

    pub fn ticket(&self, id: TicketId) -> LotteryResult<&Ticket> {
        self.registry.lookup(id)
    }

    pub fn tickets(&self) -> &[Ticket] {
        self.registry.tickets()
    }

    /// Id the next successful purchase will receive
    pub fn next_ticket_id(&self) -> TicketId {
        self.registry.next_id()
    }

    /// Tickets not yet settled, with their owners
    pub fn unpaid_tickets(&self) -> Vec<(TicketId, AccountId)> {
        self.registry
            .tickets()
            .iter()
            .filter(|t| !t.paid_out)
            .map(|t| (t.id, t.owner.clone()))
            .collect()
    }

    // ----- Draw Resolver -----

    /// Stop ticket sales ahead of the draw
    pub fn close_sales(&mut self) -> LotteryResult<()> {
        self.round.ensure_open()?;
        self.round.advance(RoundState::DrawPending)?;
        info!(round = self.round.number, tickets = self.registry.tickets_sold(), "Ticket sales closed");
        Ok(())
    }

    /// Append one official number, from any caller
    pub fn submit_drawn_number(&mut self, value: u8) -> LotteryResult<DrawState> {
        let state = self.draw.submit_drawn_number(value)?;
        self.after_draw_accepted(value, state)?;
        Ok(state)
    }

    /// Issue a token for the next number from the random draw source
    pub fn request_draw_number(&mut self) -> LotteryResult<DrawRequest> {
        let request = self.draw.request(self.round.number)?;
        if self.round.state() == RoundState::Open {
            self.round.advance(RoundState::DrawPending)?;
        }
        debug!(round = request.round, slot = request.slot, token = %request.token, "Draw request issued");
        Ok(request)
    }

    /// Apply the random draw source's response to the outstanding request
    pub fn fulfil_draw_request(&mut self, token: Uuid, value: u8) -> LotteryResult<DrawState> {
        let state = self.draw.fulfil(token, value)?;
        self.after_draw_accepted(value, state)?;
        Ok(state)
    }

    /// Operator recovery when the source never answers
    pub fn cancel_draw_request(&mut self) -> Option<DrawRequest> {
        let cancelled = self.draw.cancel_request();
        if let Some(request) = &cancelled {
            info!(round = request.round, token = %request.token, "Draw request cancelled");
        }
        cancelled
    }

    fn after_draw_accepted(&mut self, value: u8, state: DrawState) -> LotteryResult<()> {
        if self.round.state() == RoundState::Open {
            self.round.advance(RoundState::DrawPending)?;
        }
        debug!(round = self.round.number, value, filled = self.draw.fill_count(), "Drawn number accepted");

        if state == DrawState::Complete {
            self.round.advance(RoundState::DrawComplete)?;
            info!(
                round = self.round.number,
                numbers = ?self.draw.official_numbers(),
                "Draw complete"
            );
        }
        Ok(())
    }

    pub fn official_numbers(&self) -> &[u8] {
        self.draw.official_numbers()
    }

    pub fn draw_state(&self) -> DrawState {
        self.draw.state()
    }

    pub fn outstanding_draw_request(&self) -> Option<&DrawRequest> {
        self.draw.outstanding_request()
    }

    fn completed_draw(&self) -> LotteryResult<CompletedDraw> {
        self.draw.completed().ok_or_else(|| {
            LotteryError::DrawNotFinalized(format!(
                "draw has {} of {} numbers",
                self.draw.fill_count(),
                NUMBERS_PER_TICKET
            ))
        })
    }

    // ----- Tier Classifier / Prize Table -----

    /// Tier of a ticket against the completed draw
    pub fn ticket_tier(&self, id: TicketId) -> LotteryResult<usize> {
        let official = self.completed_draw()?;
        let ticket = self.registry.lookup(id)?;
        Ok(match_count(&ticket.selection, &official))
    }

    /// Counts computed locally from the registry and the completed draw
    pub fn tally_tier_statistics(&self) -> LotteryResult<TierStatistics> {
        let official = self.completed_draw()?;
        Ok(TierStatistics::tally(self.registry.tickets(), &official))
    }

    /// Accept the round's tier counts and fix the prize table. Runs once per round.
    pub fn import_tier_statistics(&mut self, counts: &[u64]) -> LotteryResult<&PrizeTable> {
        let state = self.round.state();
        if state >= RoundState::StatsImported {
            return Err(LotteryError::StatsAlreadyImported(self.round.number));
        }
        if state < RoundState::DrawComplete {
            return Err(LotteryError::DrawNotFinalized(format!(
                "round {} is {}",
                self.round.number, state
            )));
        }

        let stats = TierStatistics::from_counts(counts)?;
        if self.prizes.verify_tier_statistics {
            let tallied = self.tally_tier_statistics()?;
            if tallied != stats {
                return Err(LotteryError::BadTierStats(format!(
                    "counts {:?} do not match tallied {:?}",
                    stats.counts(),
                    tallied.counts()
                )));
            }
        }

        let table = PrizeTable::compute(
            &stats,
            self.registry.tickets_sold(),
            self.registry.aggregate_paid(),
            &self.prizes.policy(),
        )?;

        self.round.advance(RoundState::StatsImported)?;
        self.tier_statistics = Some(stats);
        info!(
            round = self.round.number,
            counts = ?stats.counts(),
            payouts = ?table.per_ticket(),
            operator_cut = table.operator_cut(),
            "Tier statistics imported"
        );
        Ok(self.prize_table.insert(table))
    }

    /// Tickets in `tier`; zero before statistics are imported
    pub fn tier_count(&self, tier: usize) -> LotteryResult<u64> {
        if tier >= TIER_COUNT {
            return Err(LotteryError::InvalidTier(tier));
        }
        match &self.tier_statistics {
            Some(stats) => stats.count(tier),
            None => Ok(0),
        }
    }

    /// Per-ticket payout for `tier`; zero before statistics are imported
    pub fn tier_payout(&self, tier: usize) -> LotteryResult<Amount> {
        if tier >= TIER_COUNT {
            return Err(LotteryError::InvalidTier(tier));
        }
        match &self.prize_table {
            Some(table) => table.payout_for(tier),
            None => Ok(0),
        }
    }

    pub fn tier_statistics(&self) -> Option<&TierStatistics> {
        self.tier_statistics.as_ref()
    }

    pub fn prize_table(&self) -> Option<&PrizeTable> {
        self.prize_table.as_ref()
    }

    // ----- Settlement Ledger -----

    /// Credit a ticket's prize to its owner, exactly once
    pub fn payout_ticket(&mut self, id: TicketId) -> LotteryResult<Payout> {
        self.round.ensure_finalized()?;
        let official = self.completed_draw()?;
        let table = self
            .prize_table
            .ok_or_else(|| LotteryError::DrawNotFinalized("prize table missing".to_string()))?;

        let ticket = self.registry.lookup_mut(id)?;
        let tier = match_count(&ticket.selection, &official);
        let amount = table.payout_for(tier)?;
        let balance = self.ledger.settle_ticket(ticket, amount)?;
        let owner = ticket.owner.clone();

        debug!(round = self.round.number, ticket = id.0, tier, amount, balance, "Ticket paid out");
        self.maybe_settle()?;

        Ok(Payout {
            ticket_id: id,
            owner,
            tier,
            amount,
        })
    }

    /// Pay every ticket not yet settled. Either every ticket is paid or none is.
    pub fn payout_all_unpaid(&mut self) -> LotteryResult<SettlementSummary> {
        self.round.ensure_finalized()?;

        let ids: Vec<TicketId> = self.unpaid_tickets().into_iter().map(|(id, _)| id).collect();
        let checkpoint = self.checkpoint_unpaid();

        match self.settle_batch(&ids) {
            Ok(summary) => {
                info!(
                    round = summary.round,
                    tickets = summary.payouts.len(),
                    total = summary.total_amount,
                    "Batch settlement complete"
                );
                Ok(summary)
            }
            Err(e) => {
                self.rollback(checkpoint);
                Err(e)
            }
        }
    }

    fn settle_batch(&mut self, ids: &[TicketId]) -> LotteryResult<SettlementSummary> {
        let mut summary = SettlementSummary {
            round: self.round.number,
            ..Default::default()
        };
        for id in ids {
            let payout = self.payout_ticket(*id)?;
            summary.total_amount = summary
                .total_amount
                .checked_add(payout.amount)
                .ok_or(LotteryError::ArithmeticOverflow("settlement total"))?;
            summary.payouts.push(payout);
        }
        Ok(summary)
    }

    pub fn is_paid(&self, id: TicketId) -> LotteryResult<bool> {
        Ok(self.registry.lookup(id)?.paid_out)
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.ledger.balance_of(account)
    }

    /// Zero the account's balance ahead of an external transfer
    pub fn begin_withdrawal(&mut self, account: &AccountId) -> Amount {
        let amount = self.ledger.take_balance(account);
        if amount > 0 {
            debug!(account = %account, amount, "Balance reserved for withdrawal");
        }
        amount
    }

    /// Re-credit a balance whose transfer failed
    pub fn abort_withdrawal(&mut self, account: &AccountId, amount: Amount) -> LotteryResult<()> {
        let balance = self.ledger.restore_balance(account, amount)?;
        info!(account = %account, amount, balance, "Withdrawal aborted, balance restored");
        Ok(())
    }

    pub fn ensure_operator(&self, caller: &AccountId) -> LotteryResult<()> {
        if *caller != self.rules.operator_account {
            return Err(LotteryError::Unauthorized(caller.clone()));
        }
        Ok(())
    }

    pub fn operator_account(&self) -> &AccountId {
        &self.rules.operator_account
    }

    /// Mark the operator cut withdrawn and return its amount
    pub fn begin_operator_cut_withdrawal(&mut self, caller: &AccountId) -> LotteryResult<Amount> {
        self.ensure_operator(caller)?;
        self.round.ensure_finalized()?;
        let amount = self
            .prize_table
            .map(|table| table.operator_cut())
            .ok_or_else(|| LotteryError::DrawNotFinalized("prize table missing".to_string()))?;

        self.round.mark_operator_cut_withdrawn()?;
        self.operator_cut_in_flight = true;
        debug!(round = self.round.number, amount, "Operator cut reserved for withdrawal");
        Ok(amount)
    }

    pub fn complete_operator_cut_withdrawal(&mut self) -> LotteryResult<()> {
        self.operator_cut_in_flight = false;
        info!(round = self.round.number, "Operator cut withdrawn");
        self.maybe_settle()
    }

    pub fn abort_operator_cut_withdrawal(&mut self) {
        self.operator_cut_in_flight = false;
        self.round.clear_operator_cut_withdrawn();
        info!(round = self.round.number, "Operator cut withdrawal aborted");
    }

    fn maybe_settle(&mut self) -> LotteryResult<()> {
        let all_paid = self.registry.tickets().iter().all(|t| t.paid_out);
        if self.round.state() == RoundState::StatsImported
            && all_paid
            && self.round.operator_cut_withdrawn()
            && !self.operator_cut_in_flight
        {
            self.round.advance(RoundState::Settled)?;
            info!(round = self.round.number, paid_in = self.round.paid_in, "Round settled");
        }
        Ok(())
    }

    // ----- Round lifecycle -----

    /// Open the next round once the current one is fully settled
    pub fn start_next_round(&mut self) -> LotteryResult<u64> {
        if self.round.state() != RoundState::Settled {
            return Err(LotteryError::RoundNotSettled(self.round.number));
        }

        let next = self.round.number + 1;
        self.round = Round::new(next);
        self.registry = TicketRegistry::new();
        self.draw = DrawResolver::new();
        self.tier_statistics = None;
        self.prize_table = None;

        info!(round = next, "Round opened");
        Ok(next)
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn round_summary(&self) -> RoundSummary {
        RoundSummary {
            round: self.round.number,
            state: self.round.state(),
            tickets_sold: self.registry.tickets_sold(),
            paid_in: self.registry.aggregate_paid(),
            tickets_paid_out: self.registry.tickets().iter().filter(|t| t.paid_out).count() as u64,
            official_numbers: self.draw.official_numbers().to_vec(),
            draw_state: self.draw.state(),
            operator_cut_withdrawn: self.round.operator_cut_withdrawn(),
        }
    }

    pub fn ticket_price(&self) -> Amount {
        self.rules.ticket_price
    }
}
