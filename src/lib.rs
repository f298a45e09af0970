//! Lotto Engine - numeric lottery settlement
//!
//! Sells fixed-price tickets of seven numbers from 1..=39, resolves an official
//! seven-number draw, classifies tickets by how many numbers they match, and
//! splits the pool across match tiers after a fixed operator cut. Every ticket
//! is paid at most once and payouts plus the operator cut never exceed what
//! was paid in.
//!
//! [`LotteryEngine`] is the synchronous state machine. [`LotteryService`] puts
//! it behind one lock, talks to the random draw source and the funds transfer
//! collaborators, and persists each accepted change to RocksDB.

pub mod common;
pub mod config;
pub mod draw_source;
pub mod engine;
pub mod errors;
pub mod lottery;
pub mod metrics;
pub mod round_store;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod transfer;

pub use common::traits::{DrawSourceError, FundsTransfer, RandomDrawSource, TransferError, TransferReceipt};
pub use config::{ConfigLoader, LotteryConfig};
pub use draw_source::{verify_draw_proof, DrawProof, VrfDrawSource};
pub use engine::{EngineCheckpoint, EngineSnapshot, LotteryEngine, Payout, RoundSummary, SettlementSummary};
pub use errors::{LotteryError, LotteryResult};
pub use lottery::{
    AccountId, Amount, DrawRequest, DrawState, PrizePolicy, PrizeTable, RoundState, Selection, Ticket, TicketId,
    TierStatistics,
};
pub use service::LotteryService;
pub use transfer::InMemoryFundsTransfer;
