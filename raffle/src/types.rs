//! Domain types for the raffle.
//!
//! - Participants waiting to be drawn
//! - Prizes, ranked 1..=N where 1 is the most valuable
//! - Winners, an append-only history of committed draws
//!
//! Every command carries a [`RequestId`]; the action that concludes it carries
//! the same id so callers can wait for exactly their own outcome.

use crate::draw;
use crate::error::{IgnoreReason, Rejection};
use crate::ranking::{PrizeRanking, RankChange};
use raffle_core::record_store::{Collection, Fields, Record, RecordId, RecordStoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Correlates a command with the action that concludes it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random `RequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! record_backed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(RecordId);

        impl $name {
            /// Wraps a raw identifier
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(RecordId::new(id))
            }

            /// Returns the record service id
            #[must_use]
            pub const fn as_record_id(&self) -> &RecordId {
                &self.0
            }
        }

        impl From<RecordId> for $name {
            fn from(id: RecordId) -> Self {
                Self(id)
            }
        }

        impl From<$name> for RecordId {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_backed_id!(
    /// Identifier of a participant, assigned by the record service
    ParticipantId
);
record_backed_id!(
    /// Identifier of a prize, assigned by the record service
    PrizeId
);
record_backed_id!(
    /// Identifier of a winner record, assigned by the record service
    WinnerId
);

fn object(entries: impl IntoIterator<Item = (&'static str, Value)>) -> Fields {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// A named entrant eligible to be drawn
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Service-assigned id
    pub id: ParticipantId,
    /// Display name (trimmed, non-empty)
    pub name: String,
}

impl Participant {
    /// Fields sent when creating a participant record
    #[must_use]
    pub fn new_fields(name: &str) -> Fields {
        object([("name", Value::from(name))])
    }

    /// Reads a participant from a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::InvalidRecord`] if the record has no name.
    pub fn from_record(record: &Record) -> Result<Self, RecordStoreError> {
        Ok(Self {
            id: record.id.clone().into(),
            name: record.str_field(Collection::Participants, "name")?.to_string(),
        })
    }
}

/// A named award with a rank; rank 1 is the most valuable
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prize {
    /// Service-assigned id
    pub id: PrizeId,
    /// Display name; also the key used to decide whether the prize is claimed
    pub name: String,
    /// Position in the ranking, starting at 1
    pub rank: u32,
}

impl Prize {
    /// Fields sent when creating a prize record
    #[must_use]
    pub fn new_fields(name: &str, rank: u32) -> Fields {
        object([("name", Value::from(name)), ("ranking", Value::from(rank))])
    }

    /// Reads a prize from a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::InvalidRecord`] if the name or ranking is missing.
    pub fn from_record(record: &Record) -> Result<Self, RecordStoreError> {
        Ok(Self {
            id: record.id.clone().into(),
            name: record.str_field(Collection::Prizes, "name")?.to_string(),
            rank: record.u32_field(Collection::Prizes, "ranking")?,
        })
    }
}

/// A committed draw outcome
///
/// Winners are immutable once recorded; the prize's name and rank are
/// captured at draw time so later prize edits do not rewrite history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    /// Service-assigned id
    pub id: WinnerId,
    /// Participant that won; absent on records written by older clients
    pub participant_id: Option<ParticipantId>,
    /// Name of the participant at draw time
    pub participant_name: String,
    /// Name of the prize at draw time
    pub prize_name: String,
    /// Rank of the prize at draw time
    pub prize_rank: u32,
    /// Local wall-clock time of the draw, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
}

impl Winner {
    /// Reads a winner from a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::InvalidRecord`] if a required field is missing.
    pub fn from_record(record: &Record) -> Result<Self, RecordStoreError> {
        let participant_id = record
            .fields
            .get("participant_id")
            .and_then(RecordId::from_json)
            .map(ParticipantId::from);
        let timestamp = ["timestamp", "created_at"]
            .iter()
            .find_map(|key| record.fields.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            id: record.id.clone().into(),
            participant_id,
            participant_name: record
                .str_field(Collection::Winners, "participant_name")?
                .to_string(),
            prize_name: record.str_field(Collection::Winners, "prize_name")?.to_string(),
            prize_rank: record.u32_field(Collection::Winners, "prize_ranking")?,
            timestamp,
        })
    }
}

/// A winner chosen by the draw but not yet persisted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WinnerDraft {
    /// Drawn participant
    pub participant: Participant,
    /// Assigned prize
    pub prize: Prize,
    /// Draw time, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
}

impl WinnerDraft {
    /// Fields sent when creating the winner record
    #[must_use]
    pub fn fields(&self) -> Fields {
        object([
            ("participant_id", Value::from(self.participant.id.to_string())),
            ("participant_name", Value::from(self.participant.name.as_str())),
            ("prize_name", Value::from(self.prize.name.as_str())),
            ("prize_ranking", Value::from(self.prize.rank)),
            ("timestamp", Value::from(self.timestamp.as_str())),
        ])
    }

    /// The committed winner once the record service assigned `id`
    #[must_use]
    pub fn into_winner(self, id: WinnerId) -> Winner {
        Winner {
            id,
            participant_id: Some(self.participant.id),
            participant_name: self.participant.name,
            prize_name: self.prize.name,
            prize_rank: self.prize.rank,
            timestamp: self.timestamp,
        }
    }
}

/// Where the draw state machine currently is
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum DrawPhase {
    /// No draw running; pool edits and new draws are accepted
    #[default]
    Idle,
    /// Highlighting random candidates
    Drawing {
        /// The draw request being served
        request: RequestId,
        /// Highlight ticks still to come
        ticks_left: u32,
    },
    /// Final pick made, persisting the winner
    Settling {
        /// The draw request being served
        request: RequestId,
    },
}

impl DrawPhase {
    /// Whether no draw is running
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// The draw request currently being served, if any
    #[must_use]
    pub const fn request(&self) -> Option<&RequestId> {
        match self {
            Self::Idle => None,
            Self::Drawing { request, .. } | Self::Settling { request } => Some(request),
        }
    }
}

/// Direction of a single prize reorder step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveDirection {
    /// Towards rank 1 (more valuable)
    Up,
    /// Away from rank 1 (less valuable)
    Down,
}

/// In-memory mirror of the three collections plus draw progress
#[derive(Clone, Debug, Default)]
pub struct RaffleState {
    pub(crate) participants: Vec<Participant>,
    pub(crate) prizes: PrizeRanking,
    pub(crate) winners: Vec<Winner>,
    pub(crate) phase: DrawPhase,
    /// A pool or prize write whose outcome has not been reduced yet
    pub(crate) in_flight: Option<RequestId>,
    pub(crate) highlighted: Option<Participant>,
    pub(crate) last_winner: Option<Winner>,
    pub(crate) last_error: Option<String>,
}

impl RaffleState {
    /// Creates an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Participants still in the pool, in insertion order
    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Prizes ordered by rank (index 0 holds rank 1)
    #[must_use]
    pub fn prizes(&self) -> &[Prize] {
        self.prizes.as_slice()
    }

    /// The prize ranking itself
    #[must_use]
    pub const fn ranking(&self) -> &PrizeRanking {
        &self.prizes
    }

    /// Winner history in draw order
    #[must_use]
    pub fn winners(&self) -> &[Winner] {
        &self.winners
    }

    /// Current draw phase
    #[must_use]
    pub const fn phase(&self) -> &DrawPhase {
        &self.phase
    }

    /// Candidate currently shown by the draw animation
    #[must_use]
    pub const fn highlighted(&self) -> Option<&Participant> {
        self.highlighted.as_ref()
    }

    /// Most recently committed winner, cleared when a new draw starts
    #[must_use]
    pub const fn last_winner(&self) -> Option<&Winner> {
        self.last_winner.as_ref()
    }

    /// Message of the last rejected or failed command
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a write is waiting for the record service
    #[must_use]
    pub const fn has_write_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether every prize has a winner
    ///
    /// Prizes sharing a name need one winner each. Vacuously true when there
    /// are no prizes.
    #[must_use]
    pub fn all_prizes_claimed(&self) -> bool {
        draw::claimed_positions(&self.prizes, &self.winners)
            .into_iter()
            .all(|claimed| claimed)
    }

    /// Whether a draw request would currently be accepted
    #[must_use]
    pub fn can_draw(&self) -> bool {
        self.draw_blocker().is_none()
    }

    /// Why a draw request would be rejected right now, if it would
    #[must_use]
    pub fn draw_blocker(&self) -> Option<Rejection> {
        if !self.phase.is_idle() {
            return Some(Rejection::DrawInProgress);
        }
        if self.in_flight.is_some() {
            return Some(Rejection::WriteInProgress);
        }
        if !self.prizes.is_empty() && self.all_prizes_claimed() {
            return Some(Rejection::AllPrizesClaimed);
        }
        if self.participants.is_empty() || self.prizes.is_empty() {
            return Some(Rejection::EmptyPool);
        }
        None
    }

    pub(crate) fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }
}

/// Actions for the raffle reducer
///
/// Commands come from the operator, the draw steps are scheduled by the
/// reducer itself, and every command ends with exactly one terminal action
/// carrying its [`RequestId`].
#[derive(Clone, Debug, PartialEq)]
pub enum RaffleAction {
    // ========== Commands ==========
    /// Command: Fetch all three collections and replace the mirror
    Load {
        /// Correlation id
        request: RequestId,
    },
    /// Command: Add a participant
    AddParticipant {
        /// Correlation id
        request: RequestId,
        /// Raw name; surrounding whitespace is trimmed
        name: String,
    },
    /// Command: Remove a participant
    RemoveParticipant {
        /// Correlation id
        request: RequestId,
        /// Participant to remove
        id: ParticipantId,
    },
    /// Command: Remove every participant
    ClearParticipants {
        /// Correlation id
        request: RequestId,
    },
    /// Command: Add a prize at the lowest rank
    AddPrize {
        /// Correlation id
        request: RequestId,
        /// Raw name; surrounding whitespace is trimmed
        name: String,
    },
    /// Command: Remove a prize and close the gap in the ranking
    RemovePrize {
        /// Correlation id
        request: RequestId,
        /// Prize to remove
        id: PrizeId,
    },
    /// Command: Swap a prize with its neighbour
    MovePrize {
        /// Correlation id
        request: RequestId,
        /// Prize to move
        id: PrizeId,
        /// Which neighbour to swap with
        direction: MoveDirection,
    },
    /// Command: Remove every prize
    ClearPrizes {
        /// Correlation id
        request: RequestId,
    },
    /// Command: Erase the winner history
    ClearWinners {
        /// Correlation id
        request: RequestId,
    },
    /// Command: Run a draw
    RequestDraw {
        /// Correlation id
        request: RequestId,
    },

    // ========== Draw steps ==========
    /// A random candidate is shown while the draw is rolling
    CandidateHighlighted {
        /// Draw being served
        request: RequestId,
        /// Candidate to show
        participant: Participant,
        /// Highlight ticks still to come after this one
        ticks_left: u32,
    },
    /// The rolling animation is over; make the final pick
    SettleDraw {
        /// Draw being served
        request: RequestId,
    },

    // ========== Events ==========
    /// Event: All collections were fetched
    Loaded {
        /// Correlation id
        request: RequestId,
        /// Stored participants
        participants: Vec<Participant>,
        /// Stored prizes, in stored order
        prizes: Vec<Prize>,
        /// Stored winners
        winners: Vec<Winner>,
    },
    /// Event: Participant was stored
    ParticipantAdded {
        /// Correlation id
        request: RequestId,
        /// Stored participant
        participant: Participant,
    },
    /// Event: Participant was deleted
    ParticipantRemoved {
        /// Correlation id
        request: RequestId,
        /// Deleted participant
        id: ParticipantId,
    },
    /// Event: Participant collection was emptied
    ParticipantsCleared {
        /// Correlation id
        request: RequestId,
    },
    /// Event: Prize was stored
    PrizeAdded {
        /// Correlation id
        request: RequestId,
        /// Stored prize
        prize: Prize,
    },
    /// Event: Prize was deleted and the ranks after it were shifted up
    PrizeRemoved {
        /// Correlation id
        request: RequestId,
        /// Deleted prize
        id: PrizeId,
        /// Ranks rewritten in the store
        changes: Vec<RankChange>,
    },
    /// Event: Two prizes swapped ranks
    PrizesReordered {
        /// Correlation id
        request: RequestId,
        /// Ranks rewritten in the store
        changes: Vec<RankChange>,
    },
    /// Event: Prize collection was emptied
    PrizesCleared {
        /// Correlation id
        request: RequestId,
    },
    /// Event: Winner history was erased
    WinnersCleared {
        /// Correlation id
        request: RequestId,
    },
    /// Event: The draw's winner was stored and the participant left the pool
    WinnerCommitted {
        /// Draw that produced the winner
        request: RequestId,
        /// Stored winner
        winner: Winner,
        /// Participant removed from the pool
        participant: ParticipantId,
    },

    // ========== Outcomes without a state change ==========
    /// A command was a deliberate no-op
    CommandIgnored {
        /// Correlation id
        request: RequestId,
        /// Why nothing happened
        reason: IgnoreReason,
    },
    /// A command failed validation
    CommandRejected {
        /// Correlation id
        request: RequestId,
        /// Why it was refused
        rejection: Rejection,
    },
    /// The record service failed; memory was left untouched
    PersistenceFailed {
        /// Correlation id
        request: RequestId,
        /// What went wrong
        error: RecordStoreError,
    },
}

impl RaffleAction {
    /// The request this action belongs to
    #[must_use]
    pub const fn request(&self) -> &RequestId {
        match self {
            Self::Load { request }
            | Self::AddParticipant { request, .. }
            | Self::RemoveParticipant { request, .. }
            | Self::ClearParticipants { request }
            | Self::AddPrize { request, .. }
            | Self::RemovePrize { request, .. }
            | Self::MovePrize { request, .. }
            | Self::ClearPrizes { request }
            | Self::ClearWinners { request }
            | Self::RequestDraw { request }
            | Self::CandidateHighlighted { request, .. }
            | Self::SettleDraw { request }
            | Self::Loaded { request, .. }
            | Self::ParticipantAdded { request, .. }
            | Self::ParticipantRemoved { request, .. }
            | Self::ParticipantsCleared { request }
            | Self::PrizeAdded { request, .. }
            | Self::PrizeRemoved { request, .. }
            | Self::PrizesReordered { request, .. }
            | Self::PrizesCleared { request }
            | Self::WinnersCleared { request }
            | Self::WinnerCommitted { request, .. }
            | Self::CommandIgnored { request, .. }
            | Self::CommandRejected { request, .. }
            | Self::PersistenceFailed { request, .. } => request,
        }
    }

    /// Whether this action concludes its request
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Loaded { .. }
                | Self::ParticipantAdded { .. }
                | Self::ParticipantRemoved { .. }
                | Self::ParticipantsCleared { .. }
                | Self::PrizeAdded { .. }
                | Self::PrizeRemoved { .. }
                | Self::PrizesReordered { .. }
                | Self::PrizesCleared { .. }
                | Self::WinnersCleared { .. }
                | Self::WinnerCommitted { .. }
                | Self::CommandIgnored { .. }
                | Self::CommandRejected { .. }
                | Self::PersistenceFailed { .. }
        )
    }

    /// Whether this action concludes `request`
    #[must_use]
    pub fn concludes(&self, request: &RequestId) -> bool {
        self.is_terminal() && self.request() == request
    }
}
