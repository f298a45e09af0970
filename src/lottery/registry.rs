//! Ticket Registry
//!
//! Stores every ticket sold in a round and assigns dense sequential ids.

use crate::errors::{LotteryError, LotteryResult};
use crate::lottery::types::{AccountId, Amount, Selection, Ticket, TicketId};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketRegistry {
    tickets: Vec<Ticket>,
    aggregate_paid: Amount,
}

impl TicketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted tickets, ordered by id
    pub fn from_tickets(mut tickets: Vec<Ticket>) -> LotteryResult<Self> {
        tickets.sort_by_key(|t| t.id);
        let mut aggregate_paid: Amount = 0;
        for (index, ticket) in tickets.iter().enumerate() {
            if ticket.id.0 != index as u64 + 1 {
                return Err(LotteryError::Storage(crate::errors::StorageError::CorruptedData(
                    format!("ticket ids are not dense: found {} at position {}", ticket.id, index + 1),
                )));
            }
            aggregate_paid = aggregate_paid
                .checked_add(ticket.amount_paid)
                .ok_or(LotteryError::ArithmeticOverflow("aggregate paid-in"))?;
        }
        Ok(Self {
            tickets,
            aggregate_paid,
        })
    }

    /// Sell a ticket. Validation happens before anything is recorded.
    pub fn purchase(
        &mut self,
        numbers: &[u8],
        payment: Amount,
        ticket_price: Amount,
        buyer: AccountId,
    ) -> LotteryResult<TicketId> {
        let selection = Selection::new(numbers)?;

        if payment != ticket_price {
            return Err(LotteryError::WrongPrice {
                expected: ticket_price,
                actual: payment,
            });
        }

        let aggregate_paid = self
            .aggregate_paid
            .checked_add(payment)
            .ok_or(LotteryError::ArithmeticOverflow("aggregate paid-in"))?;

        let id = self.next_id();
        self.tickets.push(Ticket {
            id,
            owner: buyer,
            selection,
            amount_paid: payment,
            paid_out: false,
            purchased_at: Utc::now(),
        });
        self.aggregate_paid = aggregate_paid;

        Ok(id)
    }

    pub fn lookup(&self, id: TicketId) -> LotteryResult<&Ticket> {
        self.index_of(id)
            .map(|i| &self.tickets[i])
            .ok_or(LotteryError::UnknownTicket(id))
    }

    pub(crate) fn lookup_mut(&mut self, id: TicketId) -> LotteryResult<&mut Ticket> {
        match self.index_of(id) {
            Some(i) => Ok(&mut self.tickets[i]),
            None => Err(LotteryError::UnknownTicket(id)),
        }
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn tickets_sold(&self) -> u64 {
        self.tickets.len() as u64
    }

    pub fn aggregate_paid(&self) -> Amount {
        self.aggregate_paid
    }

    /// Id the next successful purchase will receive
    pub fn next_id(&self) -> TicketId {
        TicketId(self.tickets.len() as u64 + 1)
    }

    /// Drop every ticket sold after the first `len`
    pub(crate) fn truncate(&mut self, len: usize) {
        for ticket in self.tickets.drain(len.min(self.tickets.len())..) {
            self.aggregate_paid -= ticket.amount_paid;
        }
    }

    /// Put back an earlier copy of a ticket that is still registered
    pub(crate) fn replace(&mut self, ticket: Ticket) {
        if let Some(i) = self.index_of(ticket.id) {
            self.tickets[i] = ticket;
        }
    }

    fn index_of(&self, id: TicketId) -> Option<usize> {
        let index = id.0.checked_sub(1)? as usize;
        (index < self.tickets.len()).then_some(index)
    }
}
