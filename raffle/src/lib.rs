//! # Raffle
//!
//! A prize raffle draw engine: operators register participants and ranked
//! prizes, then run animated draws that pick a winner uniformly at random and
//! award prizes from the least valuable up to the grand prize.
//!
//! The engine keeps an in-memory mirror of three collections held by an
//! external record service and never changes the mirror unless the service
//! confirmed the write.
//!
//! ## Example
//!
//! ```no_run
//! use raffle::{DrawPacing, Raffle, RaffleEnvironment};
//! use raffle_core::environment::{SystemClock, ThreadRandom};
//! use raffle_testing::InMemoryRecordStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), raffle::RaffleError> {
//! let raffle = Raffle::new(
//!     RaffleEnvironment::new(
//!         Arc::new(SystemClock),
//!         Arc::new(ThreadRandom),
//!         Arc::new(InMemoryRecordStore::new()),
//!         DrawPacing::default(),
//!     ),
//!     Duration::from_secs(30),
//! );
//!
//! raffle.add_participant("Alice").await?;
//! raffle.add_prize("Gold").await?;
//! let winner = raffle.request_draw().await?;
//! println!("{} wins {}", winner.participant_name, winner.prize_name);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod draw;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod ranking;
pub mod reducer;
pub mod rest;
pub mod types;

pub use config::Config;
pub use draw::DrawPacing;
pub use engine::Raffle;
pub use error::{IgnoreReason, RaffleError, Rejection};
pub use ranking::{PrizeRanking, RankChange};
pub use reducer::{RaffleEnvironment, RaffleReducer};
pub use rest::RestRecordStore;
pub use types::{
    DrawPhase, MoveDirection, Participant, ParticipantId, Prize, PrizeId, RaffleAction,
    RaffleState, RequestId, Winner, WinnerId,
};
