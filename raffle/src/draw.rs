//! Draw selection and pacing.
//!
//! Prize assignment walks the ranking from the least valuable prize towards
//! the most valuable one: with `P` prizes and `n` winners already recorded,
//! the next draw gets the prize at position `P - 1 - (n mod P)`. The first
//! winner therefore takes the last-ranked prize and the grand prize is drawn
//! last.

use crate::ranking::PrizeRanking;
use crate::types::{Participant, Prize, Winner};
use raffle_core::environment::RandomSource;
use std::collections::HashMap;
use std::time::Duration;

/// Timing of the rolling highlight animation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawPacing {
    /// Number of highlight ticks before the final pick
    pub ticks: u32,
    /// Delay before the first tick
    pub base_delay: Duration,
    /// Extra delay added per tick, so the roll visibly slows down
    pub step_delay: Duration,
    /// Pause between the last tick and the final pick
    pub settle_delay: Duration,
}

impl Default for DrawPacing {
    fn default() -> Self {
        Self {
            ticks: 20,
            base_delay: Duration::from_millis(10),
            step_delay: Duration::from_millis(3),
            settle_delay: Duration::from_millis(500),
        }
    }
}

impl DrawPacing {
    /// No animation: the final pick happens right away
    #[must_use]
    pub const fn instant() -> Self {
        Self {
            ticks: 0,
            base_delay: Duration::ZERO,
            step_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
        }
    }

    /// Delay before highlight tick `index` (zero-based)
    #[must_use]
    pub fn tick_delay(&self, index: u32) -> Duration {
        self.base_delay + self.step_delay * index
    }

    /// Total time from request to final pick
    #[must_use]
    pub fn total(&self) -> Duration {
        (0..self.ticks).map(|i| self.tick_delay(i)).sum::<Duration>() + self.settle_delay
    }
}

/// Picks a participant uniformly at random
#[must_use]
pub fn pick_participant<'a>(
    participants: &'a [Participant],
    random: &dyn RandomSource,
) -> Option<&'a Participant> {
    if participants.is_empty() {
        return None;
    }
    participants.get(random.pick(participants.len()))
}

/// Position of the prize the next draw is for, given how many winners exist
#[must_use]
pub const fn assigned_position(prize_count: usize, winner_count: usize) -> Option<usize> {
    if prize_count == 0 {
        return None;
    }
    Some(prize_count - 1 - (winner_count % prize_count))
}

/// Which prizes already have a winner, by position.
///
/// Winners refer to prizes by name and names may repeat, so each winner
/// claims one prize of that name, least valuable first, in award order.
#[must_use]
pub fn claimed_positions(ranking: &PrizeRanking, winners: &[Winner]) -> Vec<bool> {
    let mut unmatched: HashMap<&str, usize> = HashMap::new();
    for winner in winners {
        *unmatched.entry(winner.prize_name.as_str()).or_default() += 1;
    }

    let mut claimed: Vec<bool> = ranking
        .as_slice()
        .iter()
        .rev()
        .map(|prize| match unmatched.get_mut(prize.name.as_str()) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            },
            _ => false,
        })
        .collect();
    claimed.reverse();
    claimed
}

/// Prize for the next draw.
///
/// Normally the prize at [`assigned_position`]. If that prize is already
/// claimed (prizes were edited between draws), the least valuable unclaimed
/// prize is used instead so that no prize is ever awarded twice. Returns
/// `None` when every prize is claimed.
#[must_use]
pub fn assign_prize<'a>(ranking: &'a PrizeRanking, winners: &[Winner]) -> Option<&'a Prize> {
    let position = assigned_position(ranking.len(), winners.len())?;
    let claimed = claimed_positions(ranking, winners);

    let scheduled = ranking.get(position)?;
    if !claimed.get(position).copied().unwrap_or(false) {
        return Some(scheduled);
    }

    let fallback = ranking
        .as_slice()
        .iter()
        .zip(&claimed)
        .rev()
        .find(|(_, taken)| !**taken)
        .map(|(prize, _)| prize);
    if let Some(prize) = fallback {
        tracing::warn!(
            scheduled = %scheduled.name,
            awarded = %prize.name,
            "Scheduled prize already claimed, awarding next unclaimed prize"
        );
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParticipantId, PrizeId, WinnerId};
    use raffle_testing::ScriptedRandom;

    fn ranking(names: &[&str]) -> PrizeRanking {
        let mut ranking = PrizeRanking::new();
        for name in names {
            ranking.push(Prize {
                id: PrizeId::new(*name),
                name: (*name).to_string(),
                rank: 0,
            });
        }
        ranking
    }

    fn winner(prize_name: &str) -> Winner {
        Winner {
            id: WinnerId::new(prize_name),
            participant_id: None,
            participant_name: "someone".into(),
            prize_name: prize_name.into(),
            prize_rank: 0,
            timestamp: String::new(),
        }
    }

    #[test]
    fn positions_walk_from_last_to_first() {
        let positions: Vec<_> = (0..4).map(|n| assigned_position(3, n).unwrap()).collect();
        assert_eq!(positions, vec![2, 1, 0, 2]);
        assert_eq!(assigned_position(0, 5), None);
    }

    #[test]
    fn first_draw_gets_lowest_ranked_prize() {
        let ranking = ranking(&["Gold", "Silver"]);
        assert_eq!(assign_prize(&ranking, &[]).unwrap().name, "Silver");
        assert_eq!(assign_prize(&ranking, &[winner("Silver")]).unwrap().name, "Gold");
        assert!(assign_prize(&ranking, &[winner("Silver"), winner("Gold")]).is_none());
    }

    #[test]
    fn claimed_scheduled_prize_falls_back_to_unclaimed() {
        // "Bronze" was added after "Gold" was drawn: one winner means
        // position 1 ("Silver") is scheduled, which is still free.
        let ranking = ranking(&["Gold", "Silver", "Bronze"]);
        assert_eq!(assign_prize(&ranking, &[winner("Gold")]).unwrap().name, "Silver");

        // Scheduled position 2 ("Bronze") is taken, fall back to the least
        // valuable free prize.
        let winners = [winner("Bronze"), winner("Silver"), winner("Bronze")];
        assert_eq!(assign_prize(&ranking, &winners).unwrap().name, "Gold");
    }

    #[test]
    fn prizes_sharing_a_name_are_claimed_one_at_a_time() {
        let ranking = ranking(&["Gold", "Gift Card", "Gift Card"]);
        assert_eq!(claimed_positions(&ranking, &[winner("Gift Card")]), vec![false, false, true]);

        let second = assign_prize(&ranking, &[winner("Gift Card")]).unwrap();
        assert_eq!((second.name.as_str(), second.rank), ("Gift Card", 2));

        let winners = [winner("Gift Card"), winner("Gift Card")];
        assert_eq!(assign_prize(&ranking, &winners).unwrap().name, "Gold");
        let all = [winner("Gift Card"), winner("Gift Card"), winner("Gold")];
        assert!(assign_prize(&ranking, &all).is_none());
    }

    #[test]
    fn pick_participant_uses_random_source() {
        let people: Vec<_> = ["Alice", "Bob", "Carol"]
            .iter()
            .enumerate()
            .map(|(i, name)| Participant {
                id: ParticipantId::new(i.to_string()),
                name: (*name).into(),
            })
            .collect();
        let random = ScriptedRandom::new([4]);
        assert_eq!(pick_participant(&people, &random).unwrap().name, "Bob");
        assert!(pick_participant(&[], &random).is_none());
    }

    #[test]
    fn default_pacing_totals_roughly_a_second_and_a_quarter() {
        let pacing = DrawPacing::default();
        assert_eq!(pacing.tick_delay(0), Duration::from_millis(10));
        assert_eq!(pacing.tick_delay(19), Duration::from_millis(67));
        assert_eq!(pacing.total(), Duration::from_millis(770 + 500));
        assert_eq!(DrawPacing::instant().total(), Duration::ZERO);
    }
}
