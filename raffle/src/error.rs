//! Error types for the raffle engine.

use crate::types::{ParticipantId, PrizeId};
use raffle_core::record_store::RecordStoreError;
use raffle_runtime::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a command was refused before anything was written
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// There is nobody to draw or nothing to win
    #[error("Need at least one participant and one prize to draw")]
    EmptyPool,

    /// Every prize already has a winner
    #[error("All prizes have been claimed! Reset the game to continue.")]
    AllPrizesClaimed,

    /// A draw is running; the pools are frozen until it ends
    #[error("A draw is already in progress")]
    DrawInProgress,

    /// An earlier change is still waiting for the record service
    #[error("Another change is still being saved")]
    WriteInProgress,

    /// No participant with that id
    #[error("Unknown participant: {0}")]
    UnknownParticipant(ParticipantId),

    /// No prize with that id
    #[error("Unknown prize: {0}")]
    UnknownPrize(PrizeId),
}

impl Rejection {
    /// Short label for metrics
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::EmptyPool => "empty_pool",
            Self::AllPrizesClaimed => "all_prizes_claimed",
            Self::DrawInProgress => "draw_in_progress",
            Self::WriteInProgress => "write_in_progress",
            Self::UnknownParticipant(_) => "unknown_participant",
            Self::UnknownPrize(_) => "unknown_prize",
        }
    }
}

/// Why a command was accepted but did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    /// The name was empty after trimming
    BlankName,
    /// The prize is already first (moving up) or last (moving down)
    AtBoundary,
}

/// Errors surfaced by the [`Raffle`](crate::Raffle) facade
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RaffleError {
    /// The command was refused
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The record service failed; the in-memory state is unchanged
    #[error("Could not save changes: {0}")]
    Persistence(#[from] RecordStoreError),

    /// The store runtime failed (shutdown, timeout)
    #[error("Engine error: {0}")]
    Store(#[from] StoreError),

    /// The record service client could not be built
    #[error("Configuration error: {0}")]
    Config(String),

    /// A command concluded with an action that does not answer it
    #[error("Unexpected outcome: {0}")]
    Unexpected(String),
}

/// Result alias for facade operations
pub type Result<T> = std::result::Result<T, RaffleError>;
