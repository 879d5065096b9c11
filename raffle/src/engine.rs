//! The raffle facade.
//!
//! [`Raffle`] wraps the store and turns each operation into a command,
//! waits for the terminal action carrying the same [`RequestId`], and maps it
//! to a `Result`. Presentation layers call these methods and render from the
//! snapshot accessors or the action stream.

use crate::error::{RaffleError, Result};
use crate::reducer::{RaffleEnvironment, RaffleReducer};
use crate::types::{
    DrawPhase, MoveDirection, Participant, ParticipantId, Prize, PrizeId, RaffleAction,
    RaffleState, RequestId, Winner,
};
use raffle_runtime::Store;
use std::time::Duration;
use tokio::sync::broadcast;

/// Store specialised for the raffle
pub type RaffleStore = Store<RaffleState, RaffleAction, RaffleEnvironment, RaffleReducer>;

/// Handle to a running raffle
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Raffle {
    store: RaffleStore,
    request_timeout: Duration,
}

impl Raffle {
    /// Creates a raffle with empty state
    ///
    /// Call [`Raffle::load`] to mirror what the record service already holds.
    #[must_use]
    pub fn new(environment: RaffleEnvironment, request_timeout: Duration) -> Self {
        Self {
            store: Store::new(RaffleState::new(), RaffleReducer::new(), environment),
            request_timeout,
        }
    }

    /// Sends a command and waits for its terminal action
    async fn dispatch(&self, command: impl FnOnce(RequestId) -> RaffleAction) -> Result<RaffleAction> {
        let request = RequestId::new();
        let outcome = self
            .store
            .send_and_wait_for(
                command(request),
                |action| action.concludes(&request),
                self.request_timeout,
            )
            .await?;

        match outcome {
            RaffleAction::CommandRejected { rejection, .. } => Err(RaffleError::Rejected(rejection)),
            RaffleAction::PersistenceFailed { error, .. } => Err(RaffleError::Persistence(error)),
            other => Ok(other),
        }
    }

    async fn expect_done(&self, command: impl FnOnce(RequestId) -> RaffleAction) -> Result<()> {
        self.dispatch(command).await.map(|_| ())
    }

    /// Fetches all collections and replaces the in-memory mirror.
    ///
    /// Prize ranks are renumbered densely in stored order.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Persistence`] if any collection cannot be read;
    /// the previous mirror is kept.
    pub async fn load(&self) -> Result<()> {
        self.expect_done(|request| RaffleAction::Load { request }).await
    }

    /// Adds a participant. Blank names are ignored and return `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Rejected`] during a draw, or
    /// [`RaffleError::Persistence`] if the record could not be created.
    pub async fn add_participant(&self, name: &str) -> Result<Option<Participant>> {
        let name = name.to_string();
        match self
            .dispatch(|request| RaffleAction::AddParticipant { request, name })
            .await?
        {
            RaffleAction::ParticipantAdded { participant, .. } => Ok(Some(participant)),
            _ => Ok(None),
        }
    }

    /// Removes a participant.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Rejected`] for an unknown id or during a draw, or
    /// [`RaffleError::Persistence`] if the record could not be deleted.
    pub async fn remove_participant(&self, id: &ParticipantId) -> Result<()> {
        let id = id.clone();
        self.expect_done(|request| RaffleAction::RemoveParticipant { request, id })
            .await
    }

    /// Removes every participant.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Rejected`] during a draw, or
    /// [`RaffleError::Persistence`] if the collection could not be cleared.
    pub async fn clear_participants(&self) -> Result<()> {
        self.expect_done(|request| RaffleAction::ClearParticipants { request })
            .await
    }

    /// Adds a prize at the lowest rank. Blank names are ignored and return `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Rejected`] during a draw, or
    /// [`RaffleError::Persistence`] if the record could not be created.
    pub async fn add_prize(&self, name: &str) -> Result<Option<Prize>> {
        let name = name.to_string();
        match self
            .dispatch(|request| RaffleAction::AddPrize { request, name })
            .await?
        {
            RaffleAction::PrizeAdded { prize, .. } => Ok(Some(prize)),
            _ => Ok(None),
        }
    }

    /// Removes a prize; every lower-ranked prize moves up one rank.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Rejected`] for an unknown id or during a draw, or
    /// [`RaffleError::Persistence`] if the change could not be saved.
    pub async fn remove_prize(&self, id: &PrizeId) -> Result<()> {
        let id = id.clone();
        self.expect_done(|request| RaffleAction::RemovePrize { request, id })
            .await
    }

    async fn move_prize(&self, id: &PrizeId, direction: MoveDirection) -> Result<bool> {
        let id = id.clone();
        let outcome = self
            .dispatch(|request| RaffleAction::MovePrize {
                request,
                id,
                direction,
            })
            .await?;
        Ok(matches!(outcome, RaffleAction::PrizesReordered { .. }))
    }

    /// Swaps a prize with the one ranked just above it.
    ///
    /// Returns `false` if the prize is already first.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Rejected`] for an unknown id or during a draw, or
    /// [`RaffleError::Persistence`] if the change could not be saved.
    pub async fn move_prize_up(&self, id: &PrizeId) -> Result<bool> {
        self.move_prize(id, MoveDirection::Up).await
    }

    /// Swaps a prize with the one ranked just below it.
    ///
    /// Returns `false` if the prize is already last.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Rejected`] for an unknown id or during a draw, or
    /// [`RaffleError::Persistence`] if the change could not be saved.
    pub async fn move_prize_down(&self, id: &PrizeId) -> Result<bool> {
        self.move_prize(id, MoveDirection::Down).await
    }

    /// Removes every prize.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Rejected`] during a draw, or
    /// [`RaffleError::Persistence`] if the collection could not be cleared.
    pub async fn clear_prizes(&self) -> Result<()> {
        self.expect_done(|request| RaffleAction::ClearPrizes { request })
            .await
    }

    /// Erases the winner history.
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Rejected`] during a draw, or
    /// [`RaffleError::Persistence`] if the collection could not be cleared.
    pub async fn clear_winners(&self) -> Result<()> {
        self.expect_done(|request| RaffleAction::ClearWinners { request })
            .await
    }

    /// Runs a draw and returns the committed winner.
    ///
    /// Resolves once the animation has finished and the winner is stored.
    ///
    /// # Errors
    ///
    /// - [`RaffleError::Rejected`] if the pool is empty, every prize is
    ///   claimed, or another draw or write is running
    /// - [`RaffleError::Persistence`] if the winner could not be committed;
    ///   nothing changed
    pub async fn request_draw(&self) -> Result<Winner> {
        match self
            .dispatch(|request| RaffleAction::RequestDraw { request })
            .await?
        {
            RaffleAction::WinnerCommitted { winner, .. } => Ok(winner),
            other => Err(RaffleError::Unexpected(format!("{other:?}"))),
        }
    }

    /// Clears participants, prizes and winners, in that order.
    ///
    /// Stops at the first failure; collections cleared before it stay cleared.
    ///
    /// # Errors
    ///
    /// Returns the first failing clear.
    pub async fn reset_all(&self) -> Result<()> {
        self.clear_participants().await?;
        self.clear_prizes().await?;
        self.clear_winners().await?;
        tracing::info!("Raffle reset");
        Ok(())
    }

    /// Participants still in the pool
    pub async fn participants(&self) -> Vec<Participant> {
        self.store.state(|s| s.participants().to_vec()).await
    }

    /// Prizes in rank order
    pub async fn prizes(&self) -> Vec<Prize> {
        self.store.state(|s| s.prizes().to_vec()).await
    }

    /// Winner history in draw order
    pub async fn winners(&self) -> Vec<Winner> {
        self.store.state(|s| s.winners().to_vec()).await
    }

    /// Current draw phase
    pub async fn phase(&self) -> DrawPhase {
        self.store.state(|s| s.phase().clone()).await
    }

    /// Whether a draw would be accepted right now
    pub async fn can_draw(&self) -> bool {
        self.store.state(RaffleState::can_draw).await
    }

    /// Full state snapshot
    pub async fn snapshot(&self) -> RaffleState {
        self.store.state(Clone::clone).await
    }

    /// Every action produced by an effect, after it was reduced
    ///
    /// Highlight ticks arrive as [`RaffleAction::CandidateHighlighted`].
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RaffleAction> {
        self.store.subscribe_actions()
    }

    /// Stops accepting commands and waits for running effects
    ///
    /// # Errors
    ///
    /// Returns [`RaffleError::Store`] if effects are still running after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.store.shutdown(timeout).await.map_err(RaffleError::from)
    }
}
