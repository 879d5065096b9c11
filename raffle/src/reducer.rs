//! Raffle reducer.
//!
//! Validates operator commands against the mirror, drives the draw state
//! machine (`Idle → Drawing → Settling → Idle`) with delayed actions, and
//! describes every record service write as an effect. Memory changes only
//! when the resulting event is reduced, so a failed write leaves the mirror
//! untouched.

use crate::draw::{self, DrawPacing};
use crate::error::{IgnoreReason, Rejection};
use crate::persistence;
use crate::ranking::PrizeRanking;
use crate::types::{DrawPhase, RaffleAction, RaffleState, RequestId, WinnerDraft};
use raffle_core::{
    effect::Effect,
    environment::{Clock, RandomSource},
    record_store::{Collection, RecordStore, RecordStoreError},
    reducer::Reducer,
    smallvec, SmallVec,
};
use std::future::Future;
use std::sync::Arc;

/// Format of winner timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

type Effects = SmallVec<[Effect<RaffleAction>; 4]>;

/// Environment dependencies for the raffle reducer
#[derive(Clone)]
pub struct RaffleEnvironment {
    /// Clock for winner timestamps
    pub clock: Arc<dyn Clock>,
    /// Randomness for highlight ticks and the final pick
    pub random: Arc<dyn RandomSource>,
    /// Record service holding the three collections
    pub records: Arc<dyn RecordStore>,
    /// Draw animation timing
    pub pacing: DrawPacing,
}

impl RaffleEnvironment {
    /// Creates a new `RaffleEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        records: Arc<dyn RecordStore>,
        pacing: DrawPacing,
    ) -> Self {
        Self {
            clock,
            random,
            records,
            pacing,
        }
    }
}

/// Reducer for the raffle
#[derive(Clone, Debug, Default)]
pub struct RaffleReducer;

impl RaffleReducer {
    /// Creates a new `RaffleReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(state: &mut RaffleState, request: RequestId, rejection: Rejection) -> Effects {
        metrics::counter!("raffle.commands.rejected", "reason" => rejection.label()).increment(1);
        tracing::info!(%request, %rejection, "Command rejected");
        state.last_error = Some(rejection.to_string());
        smallvec![Effect::send(RaffleAction::CommandRejected { request, rejection })]
    }

    fn ignore(request: RequestId, reason: IgnoreReason) -> Effects {
        tracing::debug!(%request, ?reason, "Command ignored");
        smallvec![Effect::send(RaffleAction::CommandIgnored { request, reason })]
    }

    /// Pool and prize edits wait for any draw or earlier write to finish
    const fn write_blocker(state: &RaffleState) -> Option<Rejection> {
        if !state.phase.is_idle() {
            return Some(Rejection::DrawInProgress);
        }
        if state.in_flight.is_some() {
            return Some(Rejection::WriteInProgress);
        }
        None
    }

    /// Marks `request` as the write in flight and runs `write`
    fn persist<F>(state: &mut RaffleState, request: RequestId, write: F) -> Effects
    where
        F: Future<Output = RaffleAction> + Send + 'static,
    {
        state.in_flight = Some(request);
        smallvec![Effect::Future(Box::pin(async move { Some(write.await) }))]
    }

    fn outcome<T>(
        request: RequestId,
        result: Result<T, RecordStoreError>,
        event: impl FnOnce(T) -> RaffleAction,
    ) -> RaffleAction {
        match result {
            Ok(value) => event(value),
            Err(error) => RaffleAction::PersistenceFailed { request, error },
        }
    }

    fn clear(
        state: &mut RaffleState,
        env: &RaffleEnvironment,
        request: RequestId,
        collection: Collection,
        event: fn(RequestId) -> RaffleAction,
    ) -> Effects {
        if let Some(rejection) = Self::write_blocker(state) {
            return Self::reject(state, request, rejection);
        }
        let records = Arc::clone(&env.records);
        Self::persist(state, request, async move {
            let result = persistence::clear(records.as_ref(), collection).await;
            Self::outcome(request, result, |()| event(request))
        })
    }

    /// Schedules the next highlight tick, or the settle step once none are left
    fn schedule_tick(
        state: &RaffleState,
        env: &RaffleEnvironment,
        request: RequestId,
        ticks_left: u32,
    ) -> Effects {
        let settle = || -> Effects {
            smallvec![Effect::delay(
                env.pacing.settle_delay,
                RaffleAction::SettleDraw { request },
            )]
        };
        if ticks_left == 0 {
            return settle();
        }
        let Some(participant) = draw::pick_participant(&state.participants, env.random.as_ref())
        else {
            return settle();
        };

        let index = env.pacing.ticks.saturating_sub(ticks_left);
        smallvec![Effect::delay(
            env.pacing.tick_delay(index),
            RaffleAction::CandidateHighlighted {
                request,
                participant: participant.clone(),
                ticks_left: ticks_left - 1,
            },
        )]
    }

    fn settle(state: &mut RaffleState, env: &RaffleEnvironment, request: RequestId) -> Effects {
        let participant = draw::pick_participant(&state.participants, env.random.as_ref()).cloned();
        let prize = draw::assign_prize(&state.prizes, &state.winners).cloned();
        let (Some(participant), Some(prize)) = (participant, prize) else {
            state.phase = DrawPhase::Idle;
            let rejection = if !state.prizes.is_empty() && state.all_prizes_claimed() {
                Rejection::AllPrizesClaimed
            } else {
                Rejection::EmptyPool
            };
            return Self::reject(state, request, rejection);
        };

        tracing::info!(
            %request,
            participant = %participant.name,
            prize = %prize.name,
            rank = prize.rank,
            "Draw settled, committing winner"
        );
        state.phase = DrawPhase::Settling { request };
        state.highlighted = Some(participant.clone());

        let draft = WinnerDraft {
            participant,
            prize,
            timestamp: env
                .clock
                .now()
                .with_timezone(&chrono::Local)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
        };
        let records = Arc::clone(&env.records);
        smallvec![Effect::Future(Box::pin(async move {
            let participant = draft.participant.id.clone();
            let result = persistence::commit_winner(records.as_ref(), draft).await;
            Some(Self::outcome(request, result, |winner| {
                RaffleAction::WinnerCommitted {
                    request,
                    winner,
                    participant,
                }
            }))
        }))]
    }

    /// Applies a terminal action to state and releases whatever it concluded
    fn apply_event(state: &mut RaffleState, action: &RaffleAction) {
        match action {
            RaffleAction::Loaded {
                participants,
                prizes,
                winners,
                ..
            } => {
                state.participants.clone_from(participants);
                state.prizes = PrizeRanking::from_stored(prizes.clone());
                state.winners.clone_from(winners);
                state.highlighted = None;
                state.last_winner = None;
                state.last_error = None;
                tracing::info!(
                    participants = participants.len(),
                    prizes = prizes.len(),
                    winners = winners.len(),
                    "Collections loaded"
                );
            },
            RaffleAction::ParticipantAdded { participant, .. } => {
                state.participants.push(participant.clone());
                state.last_error = None;
            },
            RaffleAction::ParticipantRemoved { id, .. } => {
                state.participants.retain(|p| &p.id != id);
                state.last_error = None;
            },
            RaffleAction::ParticipantsCleared { .. } => {
                state.participants.clear();
                state.last_error = None;
            },
            RaffleAction::PrizeAdded { prize, .. } => {
                state.prizes.push(prize.clone());
                state.last_error = None;
            },
            RaffleAction::PrizeRemoved { id, .. } => {
                state.prizes.remove(id);
                state.last_error = None;
            },
            RaffleAction::PrizesReordered { changes, .. } => {
                state.prizes.apply(changes);
                state.last_error = None;
            },
            RaffleAction::PrizesCleared { .. } => {
                state.prizes.clear();
                state.last_error = None;
            },
            RaffleAction::WinnersCleared { .. } => {
                state.winners.clear();
                state.highlighted = None;
                state.last_winner = None;
                state.last_error = None;
            },
            RaffleAction::WinnerCommitted {
                request,
                winner,
                participant,
            } => {
                metrics::counter!("raffle.draws.committed").increment(1);
                tracing::info!(
                    %request,
                    participant = %winner.participant_name,
                    prize = %winner.prize_name,
                    "Winner committed"
                );
                state.participants.retain(|p| &p.id != participant);
                state.winners.push(winner.clone());
                state.last_winner = Some(winner.clone());
                state.last_error = None;
            },
            RaffleAction::PersistenceFailed { request, error } => {
                tracing::error!(%request, %error, "Change not saved, state left unchanged");
                state.last_error = Some(error.to_string());
            },
            RaffleAction::CommandIgnored { .. } | RaffleAction::CommandRejected { .. } => {},
            // Commands and draw steps are not applied here
            RaffleAction::Load { .. }
            | RaffleAction::AddParticipant { .. }
            | RaffleAction::RemoveParticipant { .. }
            | RaffleAction::ClearParticipants { .. }
            | RaffleAction::AddPrize { .. }
            | RaffleAction::RemovePrize { .. }
            | RaffleAction::MovePrize { .. }
            | RaffleAction::ClearPrizes { .. }
            | RaffleAction::ClearWinners { .. }
            | RaffleAction::RequestDraw { .. }
            | RaffleAction::CandidateHighlighted { .. }
            | RaffleAction::SettleDraw { .. } => return,
        }

        let request = action.request();
        if state.in_flight.as_ref() == Some(request) {
            state.in_flight = None;
        }
        if state.phase.request() == Some(request) {
            state.phase = DrawPhase::Idle;
        }
    }
}

impl Reducer for RaffleReducer {
    type State = RaffleState;
    type Action = RaffleAction;
    type Environment = RaffleEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per command
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            RaffleAction::Load { request } => {
                if let Some(rejection) = Self::write_blocker(state) {
                    return Self::reject(state, request, rejection);
                }
                let records = Arc::clone(&env.records);
                Self::persist(state, request, async move {
                    let result = persistence::load_all(records.as_ref()).await;
                    Self::outcome(request, result, |(participants, prizes, winners)| {
                        RaffleAction::Loaded {
                            request,
                            participants,
                            prizes,
                            winners,
                        }
                    })
                })
            },

            RaffleAction::AddParticipant { request, name } => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Self::ignore(request, IgnoreReason::BlankName);
                }
                if let Some(rejection) = Self::write_blocker(state) {
                    return Self::reject(state, request, rejection);
                }
                let records = Arc::clone(&env.records);
                Self::persist(state, request, async move {
                    let result = persistence::create_participant(records.as_ref(), &name).await;
                    Self::outcome(request, result, |participant| RaffleAction::ParticipantAdded {
                        request,
                        participant,
                    })
                })
            },

            RaffleAction::RemoveParticipant { request, id } => {
                if let Some(rejection) = Self::write_blocker(state) {
                    return Self::reject(state, request, rejection);
                }
                if state.participant(&id).is_none() {
                    return Self::reject(state, request, Rejection::UnknownParticipant(id));
                }
                let records = Arc::clone(&env.records);
                Self::persist(state, request, async move {
                    let result = persistence::delete_participant(records.as_ref(), &id).await;
                    Self::outcome(request, result, |()| RaffleAction::ParticipantRemoved {
                        request,
                        id,
                    })
                })
            },

            RaffleAction::ClearParticipants { request } => Self::clear(
                state,
                env,
                request,
                Collection::Participants,
                |request| RaffleAction::ParticipantsCleared { request },
            ),

            RaffleAction::AddPrize { request, name } => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Self::ignore(request, IgnoreReason::BlankName);
                }
                if let Some(rejection) = Self::write_blocker(state) {
                    return Self::reject(state, request, rejection);
                }
                let rank = state.prizes.next_rank();
                let records = Arc::clone(&env.records);
                Self::persist(state, request, async move {
                    let result = persistence::create_prize(records.as_ref(), &name, rank).await;
                    Self::outcome(request, result, |prize| RaffleAction::PrizeAdded {
                        request,
                        prize,
                    })
                })
            },

            RaffleAction::RemovePrize { request, id } => {
                if let Some(rejection) = Self::write_blocker(state) {
                    return Self::reject(state, request, rejection);
                }
                let Some(changes) = state.prizes.plan_remove(&id) else {
                    return Self::reject(state, request, Rejection::UnknownPrize(id));
                };
                let records = Arc::clone(&env.records);
                Self::persist(state, request, async move {
                    let result = persistence::remove_prize(records.as_ref(), &id, &changes).await;
                    Self::outcome(request, result, |()| RaffleAction::PrizeRemoved {
                        request,
                        id,
                        changes,
                    })
                })
            },

            RaffleAction::MovePrize {
                request,
                id,
                direction,
            } => {
                if let Some(rejection) = Self::write_blocker(state) {
                    return Self::reject(state, request, rejection);
                }
                if state.prizes.position(&id).is_none() {
                    return Self::reject(state, request, Rejection::UnknownPrize(id));
                }
                let Some(changes) = state.prizes.plan_move(&id, direction) else {
                    return Self::ignore(request, IgnoreReason::AtBoundary);
                };
                let records = Arc::clone(&env.records);
                Self::persist(state, request, async move {
                    let result = persistence::write_rank_changes(records.as_ref(), &changes).await;
                    Self::outcome(request, result, |()| RaffleAction::PrizesReordered {
                        request,
                        changes,
                    })
                })
            },

            RaffleAction::ClearPrizes { request } => Self::clear(
                state,
                env,
                request,
                Collection::Prizes,
                |request| RaffleAction::PrizesCleared { request },
            ),

            RaffleAction::ClearWinners { request } => Self::clear(
                state,
                env,
                request,
                Collection::Winners,
                |request| RaffleAction::WinnersCleared { request },
            ),

            RaffleAction::RequestDraw { request } => {
                if let Some(rejection) = state.draw_blocker() {
                    metrics::counter!("raffle.draws.rejected", "reason" => rejection.label())
                        .increment(1);
                    return Self::reject(state, request, rejection);
                }
                tracing::info!(
                    %request,
                    participants = state.participants.len(),
                    prizes = state.prizes.len(),
                    "Draw started"
                );
                state.phase = DrawPhase::Drawing {
                    request,
                    ticks_left: env.pacing.ticks,
                };
                state.highlighted = None;
                state.last_winner = None;
                state.last_error = None;
                Self::schedule_tick(state, env, request, env.pacing.ticks)
            },

            // ========== Draw steps ==========
            RaffleAction::CandidateHighlighted {
                request,
                participant,
                ticks_left,
            } => {
                match &mut state.phase {
                    DrawPhase::Drawing {
                        request: current,
                        ticks_left: left,
                    } if *current == request => *left = ticks_left,
                    _ => {
                        tracing::debug!(%request, "Stale highlight tick dropped");
                        return SmallVec::new();
                    },
                }
                state.highlighted = Some(participant);
                Self::schedule_tick(state, env, request, ticks_left)
            },

            RaffleAction::SettleDraw { request } => {
                let current = matches!(
                    &state.phase,
                    DrawPhase::Drawing { request: current, .. } if *current == request
                );
                if !current {
                    tracing::debug!(%request, "Stale settle step dropped");
                    return SmallVec::new();
                }
                Self::settle(state, env, request)
            },

            // ========== Events ==========
            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}
