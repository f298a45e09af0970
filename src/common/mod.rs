//! Shared interfaces used across the lottery service

pub mod traits;
