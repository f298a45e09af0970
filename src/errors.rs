//! Error types for the lottery settlement engine
//!
//! Every rejected operation surfaces one of these kinds to the caller. None of
//! them is fatal to the engine: other tickets and accounts keep working after
//! any single rejection.

use crate::lottery::round::RoundState;
use crate::lottery::types::{AccountId, Amount, TicketId};

/// Root error type for all lottery operations
#[derive(Debug, thiserror::Error)]
pub enum LotteryError {
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Wrong price: expected {expected}, got {actual}")]
    WrongPrice { expected: Amount, actual: Amount },

    #[error("Unknown ticket: {0}")]
    UnknownTicket(TicketId),

    #[error("Drawn number {0} is outside 1..=39")]
    OutOfRange(u8),

    #[error("Number {0} has already been drawn")]
    DuplicateDraw(u8),

    #[error("Draw is already complete")]
    DrawAlreadyComplete,

    #[error("Draw not finalized: {0}")]
    DrawNotFinalized(String),

    #[error("Bad tier statistics: {0}")]
    BadTierStats(String),

    #[error("Tier statistics already imported for round {0}")]
    StatsAlreadyImported(u64),

    #[error("Ticket {0} has already been paid out")]
    AlreadyPaid(TicketId),

    #[error("Operator cut already withdrawn for round {0}")]
    AlreadyWithdrawn(u64),

    #[error("Account {0} is not authorized for this operation")]
    Unauthorized(AccountId),

    #[error("Funds transfer failed: {0}")]
    TransferFailed(String),

    #[error("Ticket sales are closed for round {0}")]
    SalesClosed(u64),

    #[error("Round {0} is not settled yet")]
    RoundNotSettled(u64),

    #[error("A draw request is already outstanding: {0}")]
    DrawRequestPending(uuid::Uuid),

    #[error("No outstanding draw request with token {0}")]
    UnknownDrawRequest(uuid::Uuid),

    #[error("Random draw source failed: {0}")]
    DrawSourceFailed(String),

    #[error("Round {round} cannot move from {from} to {to}")]
    InvalidTransition {
        round: u64,
        from: RoundState,
        to: RoundState,
    },

    #[error("Invalid tier: {0} (expected 0..=7)")]
    InvalidTier(usize),

    #[error("Arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Monitoring error: {0}")]
    Monitoring(String),
}

/// Storage system errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

/// Configuration and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

impl LotteryError {
    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            LotteryError::InvalidSelection(_) => "INVALID_SELECTION",
            LotteryError::WrongPrice { .. } => "WRONG_PRICE",
            LotteryError::UnknownTicket(_) => "UNKNOWN_TICKET",
            LotteryError::OutOfRange(_) => "OUT_OF_RANGE",
            LotteryError::DuplicateDraw(_) => "DUPLICATE_DRAW",
            LotteryError::DrawAlreadyComplete => "DRAW_ALREADY_COMPLETE",
            LotteryError::DrawNotFinalized(_) => "DRAW_NOT_FINALIZED",
            LotteryError::BadTierStats(_) => "BAD_TIER_STATS",
            LotteryError::StatsAlreadyImported(_) => "STATS_ALREADY_IMPORTED",
            LotteryError::AlreadyPaid(_) => "ALREADY_PAID",
            LotteryError::AlreadyWithdrawn(_) => "ALREADY_WITHDRAWN",
            LotteryError::Unauthorized(_) => "UNAUTHORIZED",
            LotteryError::TransferFailed(_) => "TRANSFER_FAILED",
            LotteryError::SalesClosed(_) => "SALES_CLOSED",
            LotteryError::RoundNotSettled(_) => "ROUND_NOT_SETTLED",
            LotteryError::DrawRequestPending(_) => "DRAW_REQUEST_PENDING",
            LotteryError::UnknownDrawRequest(_) => "UNKNOWN_DRAW_REQUEST",
            LotteryError::DrawSourceFailed(_) => "DRAW_SOURCE_FAILED",
            LotteryError::InvalidTransition { .. } => "INVALID_TRANSITION",
            LotteryError::InvalidTier(_) => "INVALID_TIER",
            LotteryError::ArithmeticOverflow(_) => "ARITHMETIC_OVERFLOW",
            LotteryError::Storage(_) => "STORAGE_ERROR",
            LotteryError::Configuration(_) => "CONFIGURATION_ERROR",
            LotteryError::Monitoring(_) => "MONITORING_ERROR",
        }
    }
}

// External error conversions
impl From<rocksdb::Error> for LotteryError {
    fn from(e: rocksdb::Error) -> Self {
        LotteryError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<prometheus::Error> for LotteryError {
    fn from(e: prometheus::Error) -> Self {
        LotteryError::Monitoring(e.to_string())
    }
}

// Convenience type alias for Results
pub type LotteryResult<T> = Result<T, LotteryError>;
