//! Draw Resolver
//!
//! Accumulates officially drawn numbers one at a time. The resolver never
//! generates randomness: every number comes from an external source, either as
//! a direct submission or as the response to an outstanding [`DrawRequest`].

use crate::errors::{LotteryError, LotteryResult, StorageError};
use crate::lottery::types::{in_range, NUMBERS_PER_TICKET};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fill state of the official draw
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DrawState {
    Pending,
    Filling,
    Complete,
}

/// Token for one outstanding request to the random draw source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawRequest {
    pub token: Uuid,
    pub round: u64,
    /// Position in the draw the response will fill
    pub slot: usize,
    pub issued_at: DateTime<Utc>,
}

/// The seven official numbers of a finished draw
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedDraw([u8; NUMBERS_PER_TICKET]);

impl CompletedDraw {
    pub fn numbers(&self) -> &[u8; NUMBERS_PER_TICKET] {
        &self.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrawResolver {
    numbers: Vec<u8>,
    outstanding: Option<DrawRequest>,
}

impl DrawResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a resolver from persisted parts, re-checking every invariant
    pub fn restore(numbers: Vec<u8>, outstanding: Option<DrawRequest>) -> LotteryResult<Self> {
        let mut resolver = Self::new();
        for value in numbers {
            resolver.submit_drawn_number(value).map_err(|e| {
                LotteryError::Storage(StorageError::CorruptedData(format!(
                    "persisted draw is invalid: {}",
                    e
                )))
            })?;
        }
        if outstanding.is_some() && resolver.is_complete() {
            return Err(LotteryError::Storage(StorageError::CorruptedData(
                "draw request outstanding on a complete draw".to_string(),
            )));
        }
        resolver.outstanding = outstanding;
        Ok(resolver)
    }

    pub fn state(&self) -> DrawState {
        match self.numbers.len() {
            0 => DrawState::Pending,
            n if n < NUMBERS_PER_TICKET => DrawState::Filling,
            _ => DrawState::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state() == DrawState::Complete
    }

    pub fn fill_count(&self) -> usize {
        self.numbers.len()
    }

    /// Append one official number
    pub fn submit_drawn_number(&mut self, value: u8) -> LotteryResult<DrawState> {
        if self.is_complete() {
            return Err(LotteryError::DrawAlreadyComplete);
        }
        if !in_range(value) {
            return Err(LotteryError::OutOfRange(value));
        }
        if self.numbers.contains(&value) {
            return Err(LotteryError::DuplicateDraw(value));
        }

        self.numbers.push(value);
        if self.is_complete() {
            // A direct submission can finish the draw while a request is still out
            self.outstanding = None;
        }
        Ok(self.state())
    }

    /// Current, possibly partial, result
    pub fn official_numbers(&self) -> &[u8] {
        &self.numbers
    }

    pub fn completed(&self) -> Option<CompletedDraw> {
        let numbers: [u8; NUMBERS_PER_TICKET] = self.numbers.as_slice().try_into().ok()?;
        Some(CompletedDraw(numbers))
    }

    pub fn outstanding_request(&self) -> Option<&DrawRequest> {
        self.outstanding.as_ref()
    }

    /// Issue a request token for the next number. At most one may be outstanding.
    pub fn request(&mut self, round: u64) -> LotteryResult<DrawRequest> {
        if self.is_complete() {
            return Err(LotteryError::DrawAlreadyComplete);
        }
        if let Some(pending) = &self.outstanding {
            return Err(LotteryError::DrawRequestPending(pending.token));
        }

        let request = DrawRequest {
            token: Uuid::new_v4(),
            round,
            slot: self.numbers.len(),
            issued_at: Utc::now(),
        };
        self.outstanding = Some(request.clone());
        Ok(request)
    }

    /// Apply the response to the outstanding request.
    ///
    /// A response retires its request even when the value is rejected; the
    /// draw itself only changes when the value is accepted.
    pub fn fulfil(&mut self, token: Uuid, value: u8) -> LotteryResult<DrawState> {
        match &self.outstanding {
            Some(pending) if pending.token == token => {}
            _ => return Err(LotteryError::UnknownDrawRequest(token)),
        }
        self.outstanding = None;
        self.submit_drawn_number(value)
    }

    /// Drop the outstanding request, if any
    pub fn cancel_request(&mut self) -> Option<DrawRequest> {
        self.outstanding.take()
    }
}
