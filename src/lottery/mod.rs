//! Lottery accounting core: tickets, draw, tiers, prizes, settlement

pub mod types;
pub mod registry;
pub mod draw;
pub mod classifier;
pub mod prize;
pub mod ledger;
pub mod round;

pub use types::*;
pub use registry::TicketRegistry;
pub use draw::{CompletedDraw, DrawRequest, DrawResolver, DrawState};
pub use classifier::{match_count, TierStatistics};
pub use prize::{PrizePolicy, PrizeTable};
pub use ledger::SettlementLedger;
pub use round::{Round, RoundState};
