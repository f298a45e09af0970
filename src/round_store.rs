//! Persistent round records stored in RocksDB.
//!
//! Key layout (all values JSON):
//!
//! ```text
//! lotto:meta:current_round                 -> u64
//! lotto:round:<n>:state                    -> Round
//! lotto:round:<n>:draw                     -> DrawRecord
//! lotto:round:<n>:stats                    -> TierStatistics
//! lotto:round:<n>:prizes                   -> PrizeTable
//! lotto:round:<n>:ticket:<id>              -> Ticket
//! lotto:balance:<account>                  -> Amount
//! ```
//!
//! Round and ticket ids are zero-padded so prefix scans return them in order.
//! Finished rounds stay on disk as history.

use crate::engine::{EngineSnapshot, LotteryEngine};
use crate::errors::{LotteryError, LotteryResult, StorageError};
use crate::lottery::{AccountId, Amount, DrawRequest, PrizeTable, Round, Ticket, TicketId, TierStatistics};
use crate::storage::{LotteryStorage, StorageBatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

const CURRENT_ROUND_KEY: &[u8] = b"lotto:meta:current_round";
const ROUND_PREFIX: &str = "lotto:round:";
const BALANCE_PREFIX: &str = "lotto:balance:";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DrawRecord {
    numbers: Vec<u8>,
    outstanding: Option<DrawRequest>,
}

fn round_key(round: u64, suffix: &str) -> Vec<u8> {
    format!("{}{:020}:{}", ROUND_PREFIX, round, suffix).into_bytes()
}

fn ticket_prefix(round: u64) -> Vec<u8> {
    round_key(round, "ticket:")
}

fn ticket_key(round: u64, id: TicketId) -> Vec<u8> {
    format!("{}{:020}:ticket:{:020}", ROUND_PREFIX, round, id.0).into_bytes()
}

fn balance_key(account: &AccountId) -> Vec<u8> {
    format!("{}{}", BALANCE_PREFIX, account.as_str()).into_bytes()
}

fn encode<T: Serialize>(what: &str, value: &T) -> LotteryResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        LotteryError::Storage(StorageError::WriteFailed(format!("Failed to encode {}: {}", what, e)))
    })
}

fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> LotteryResult<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        LotteryError::Storage(StorageError::CorruptedData(format!("Failed to decode {}: {}", what, e)))
    })
}

/// Records touched by one engine mutation, beyond the always-written round header
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    tickets: Vec<TicketId>,
    accounts: Vec<AccountId>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket(mut self, id: TicketId) -> Self {
        self.tickets.push(id);
        self
    }

    pub fn account(mut self, account: AccountId) -> Self {
        self.accounts.push(account);
        self
    }
}

#[derive(Clone)]
pub struct RoundStore {
    storage: LotteryStorage,
}

impl RoundStore {
    pub fn new(storage: LotteryStorage) -> Self {
        Self { storage }
    }

    /// Write the whole live round and every balance in one batch
    pub fn save_snapshot(&self, snapshot: &EngineSnapshot) -> LotteryResult<()> {
        let round = snapshot.round.number;
        let mut batch = StorageBatch::new();

        self.put_round_header(
            &mut batch,
            &snapshot.round,
            &snapshot.draw_numbers,
            snapshot.outstanding_request.as_ref(),
            snapshot.tier_statistics.as_ref(),
            snapshot.prize_table.as_ref(),
        )?;

        batch.delete_prefix(&ticket_prefix(round));
        for ticket in &snapshot.tickets {
            batch.put(&ticket_key(round, ticket.id), &encode("ticket", ticket)?);
        }

        batch.delete_prefix(BALANCE_PREFIX.as_bytes());
        for (account, amount) in &snapshot.balances {
            batch.put(&balance_key(account), &encode("balance", amount)?);
        }

        debug!(round, entries = batch.len(), "Persisting full round snapshot");
        self.storage.write(batch)
    }

    /// Write the round header plus the records named in `changes`, atomically
    pub fn save_changes(&self, engine: &LotteryEngine, changes: &ChangeSet) -> LotteryResult<()> {
        let round = engine.round();
        let outstanding = engine.outstanding_draw_request();
        let mut batch = StorageBatch::new();

        self.put_round_header(
            &mut batch,
            round,
            engine.official_numbers(),
            outstanding,
            engine.tier_statistics(),
            engine.prize_table(),
        )?;

        for id in &changes.tickets {
            let ticket = engine.ticket(*id)?;
            batch.put(&ticket_key(round.number, *id), &encode("ticket", ticket)?);
        }

        for account in &changes.accounts {
            let balance = engine.balance_of(account);
            if balance == 0 {
                batch.delete(&balance_key(account));
            } else {
                batch.put(&balance_key(account), &encode("balance", &balance)?);
            }
        }

        debug!(
            round = round.number,
            tickets = changes.tickets.len(),
            accounts = changes.accounts.len(),
            "Persisting round changes"
        );
        self.storage.write(batch)
    }

    fn put_round_header(
        &self,
        batch: &mut StorageBatch,
        round: &Round,
        draw_numbers: &[u8],
        outstanding: Option<&DrawRequest>,
        stats: Option<&TierStatistics>,
        prizes: Option<&PrizeTable>,
    ) -> LotteryResult<()> {
        let n = round.number;
        batch.put(CURRENT_ROUND_KEY, &encode("current round", &n)?);
        batch.put(&round_key(n, "state"), &encode("round", round)?);

        let draw = DrawRecord {
            numbers: draw_numbers.to_vec(),
            outstanding: outstanding.cloned(),
        };
        batch.put(&round_key(n, "draw"), &encode("draw", &draw)?);

        match stats {
            Some(stats) => batch.put(&round_key(n, "stats"), &encode("tier statistics", stats)?),
            None => batch.delete(&round_key(n, "stats")),
        }
        match prizes {
            Some(prizes) => batch.put(&round_key(n, "prizes"), &encode("prize table", prizes)?),
            None => batch.delete(&round_key(n, "prizes")),
        }
        Ok(())
    }

    pub fn current_round(&self) -> LotteryResult<Option<u64>> {
        match self.storage.get(CURRENT_ROUND_KEY)? {
            Some(bytes) => Ok(Some(decode("current round", &bytes)?)),
            None => Ok(None),
        }
    }

    fn get_decoded<T: DeserializeOwned>(&self, what: &str, key: &[u8]) -> LotteryResult<Option<T>> {
        match self.storage.get(key)? {
            Some(bytes) => Ok(Some(decode(what, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Header of any round still on disk
    pub fn load_round(&self, round: u64) -> LotteryResult<Option<Round>> {
        self.get_decoded("round", &round_key(round, "state"))
    }

    /// Tickets of any round still on disk, in id order
    pub fn load_round_tickets(&self, round: u64) -> LotteryResult<Vec<Ticket>> {
        self.storage
            .scan_prefix(&ticket_prefix(round))?
            .into_iter()
            .map(|(_key, value)| decode("ticket", &value))
            .collect()
    }

    pub fn load_balances(&self) -> LotteryResult<Vec<(AccountId, Amount)>> {
        self.storage
            .scan_prefix(BALANCE_PREFIX.as_bytes())?
            .into_iter()
            .map(|(key, value)| {
                let account = String::from_utf8(key[BALANCE_PREFIX.len()..].to_vec()).map_err(|e| {
                    LotteryError::Storage(StorageError::CorruptedData(format!("Invalid balance key: {}", e)))
                })?;
                Ok((AccountId::new(account), decode("balance", &value)?))
            })
            .collect()
    }

    /// Everything needed to resume the live round, or `None` on a fresh database
    pub fn load_snapshot(&self) -> LotteryResult<Option<EngineSnapshot>> {
        let Some(number) = self.current_round()? else {
            return Ok(None);
        };

        let round: Round = self.load_round(number)?.ok_or_else(|| {
            LotteryError::Storage(StorageError::CorruptedData(format!("Round {} header missing", number)))
        })?;
        let draw: DrawRecord = self
            .get_decoded("draw", &round_key(number, "draw"))?
            .unwrap_or_default();

        Ok(Some(EngineSnapshot {
            round,
            tickets: self.load_round_tickets(number)?,
            draw_numbers: draw.numbers,
            outstanding_request: draw.outstanding,
            tier_statistics: self.get_decoded("tier statistics", &round_key(number, "stats"))?,
            prize_table: self.get_decoded("prize table", &round_key(number, "prizes"))?,
            balances: self.load_balances()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LotteryConfig;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> RoundStore {
        RoundStore::new(LotteryStorage::new(dir.path()).unwrap())
    }

    #[test]
    fn test_fresh_store_has_no_snapshot() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load_snapshot().unwrap().is_none());
    }

    #[test]
    fn test_changes_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let config = LotteryConfig::testing();
        let mut engine = LotteryEngine::new(&config).unwrap();
        store.save_snapshot(&engine.snapshot()).unwrap();

        let price = engine.ticket_price();
        let alice = AccountId::new("alice");
        let id = engine.purchase(&[1, 2, 3, 4, 5, 6, 7], price, alice.clone()).unwrap();
        store.save_changes(&engine, &ChangeSet::new().ticket(id)).unwrap();

        engine.submit_drawn_number(9).unwrap();
        store.save_changes(&engine, &ChangeSet::new()).unwrap();

        let snapshot = store.load_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.round.paid_in, price);
        assert_eq!(snapshot.tickets.len(), 1);
        assert_eq!(snapshot.tickets[0].owner, alice);
        assert_eq!(snapshot.draw_numbers, vec![9]);

        let restored = LotteryEngine::restore(&config, snapshot).unwrap();
        assert_eq!(restored.round().state(), engine.round().state());
    }

    #[test]
    fn test_zero_balance_is_deleted() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let bob = AccountId::new("bob");

        store.storage.put(&balance_key(&bob), b"42").unwrap();
        assert_eq!(store.load_balances().unwrap(), vec![(bob.clone(), 42)]);

        let engine = LotteryEngine::new(&LotteryConfig::testing()).unwrap();
        store.save_changes(&engine, &ChangeSet::new().account(bob)).unwrap();
        assert!(store.load_balances().unwrap().is_empty());
    }

    #[test]
    fn test_ticket_keys_sort_numerically() {
        assert!(ticket_key(1, TicketId(9)) < ticket_key(1, TicketId(10)));
        assert!(round_key(9, "state") < round_key(10, "state"));
    }

    #[test]
    fn test_corrupted_record_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.storage.put(CURRENT_ROUND_KEY, b"1").unwrap();
        store.storage.put(&round_key(1, "state"), b"not json").unwrap();

        let err = store.load_snapshot().unwrap_err();
        assert!(matches!(err, LotteryError::Storage(StorageError::CorruptedData(_))));
    }
}
