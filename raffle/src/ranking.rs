//! Dense prize ranking.
//!
//! Prizes are kept ordered by rank with the invariant that the prize at
//! index `i` has rank `i + 1`. Reorders and removals are first *planned* as a
//! list of [`RankChange`]s so the same changes can be written to the record
//! service, undone on failure, and only then applied in memory.

use crate::types::{MoveDirection, Prize, PrizeId};
use serde::{Deserialize, Serialize};

/// One prize's rank moving from `from` to `to`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankChange {
    /// Prize whose rank changes
    pub id: PrizeId,
    /// Rank before the change
    pub from: u32,
    /// Rank after the change
    pub to: u32,
}

impl RankChange {
    /// The change that undoes this one
    #[must_use]
    pub fn reverted(&self) -> Self {
        Self {
            id: self.id.clone(),
            from: self.to,
            to: self.from,
        }
    }
}

fn rank_at(position: usize) -> u32 {
    u32::try_from(position + 1).unwrap_or(u32::MAX)
}

/// Prizes ordered by rank, ranks always exactly `1..=len`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrizeRanking {
    prizes: Vec<Prize>,
}

impl PrizeRanking {
    /// Creates an empty ranking
    #[must_use]
    pub const fn new() -> Self {
        Self { prizes: Vec::new() }
    }

    /// Builds a ranking from prizes as stored.
    ///
    /// Stored ranks may have gaps or duplicates (other clients, partial
    /// failures). Prizes are ordered by stored rank, ties keep their stored
    /// order, and ranks are then renumbered densely from 1.
    #[must_use]
    pub fn from_stored(mut prizes: Vec<Prize>) -> Self {
        prizes.sort_by_key(|p| p.rank);
        let mut ranking = Self { prizes };
        ranking.renumber();
        ranking
    }

    /// Prizes in rank order
    #[must_use]
    pub fn as_slice(&self) -> &[Prize] {
        &self.prizes
    }

    /// Iterates prizes in rank order
    pub fn iter(&self) -> std::slice::Iter<'_, Prize> {
        self.prizes.iter()
    }

    /// Number of prizes
    #[must_use]
    pub fn len(&self) -> usize {
        self.prizes.len()
    }

    /// Whether there are no prizes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prizes.is_empty()
    }

    /// Prize at zero-based `position` (rank `position + 1`)
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Prize> {
        self.prizes.get(position)
    }

    /// Zero-based position of a prize
    #[must_use]
    pub fn position(&self, id: &PrizeId) -> Option<usize> {
        self.prizes.iter().position(|p| &p.id == id)
    }

    /// Rank a newly added prize receives
    #[must_use]
    pub fn next_rank(&self) -> u32 {
        rank_at(self.prizes.len())
    }

    /// Appends a prize at the lowest rank, overriding whatever rank it carried
    pub fn push(&mut self, mut prize: Prize) {
        prize.rank = self.next_rank();
        self.prizes.push(prize);
    }

    /// Rank changes for swapping a prize with its neighbour.
    ///
    /// Returns `None` if the prize is unknown or already at the boundary in
    /// that direction.
    #[must_use]
    pub fn plan_move(&self, id: &PrizeId, direction: MoveDirection) -> Option<Vec<RankChange>> {
        let position = self.position(id)?;
        let neighbour = match direction {
            MoveDirection::Up => position.checked_sub(1)?,
            MoveDirection::Down => Some(position + 1).filter(|&n| n < self.prizes.len())?,
        };

        let moved = &self.prizes[position];
        let displaced = &self.prizes[neighbour];
        Some(vec![
            RankChange {
                id: moved.id.clone(),
                from: moved.rank,
                to: displaced.rank,
            },
            RankChange {
                id: displaced.id.clone(),
                from: displaced.rank,
                to: moved.rank,
            },
        ])
    }

    /// Rank changes needed to close the gap left by removing a prize.
    ///
    /// Every prize ranked after the removed one moves up by one. Returns
    /// `None` if the prize is unknown.
    #[must_use]
    pub fn plan_remove(&self, id: &PrizeId) -> Option<Vec<RankChange>> {
        let position = self.position(id)?;
        Some(
            self.prizes[position + 1..]
                .iter()
                .map(|p| RankChange {
                    id: p.id.clone(),
                    from: p.rank,
                    to: p.rank.saturating_sub(1),
                })
                .collect(),
        )
    }

    /// Applies planned rank changes and restores rank order
    pub fn apply(&mut self, changes: &[RankChange]) {
        for change in changes {
            if let Some(prize) = self.prizes.iter_mut().find(|p| p.id == change.id) {
                prize.rank = change.to;
            }
        }
        self.prizes.sort_by_key(|p| p.rank);
        self.renumber();
    }

    /// Removes a prize and shifts every later prize up one rank
    pub fn remove(&mut self, id: &PrizeId) -> Option<Prize> {
        let position = self.position(id)?;
        let removed = self.prizes.remove(position);
        self.renumber();
        Some(removed)
    }

    /// Removes every prize
    pub fn clear(&mut self) {
        self.prizes.clear();
    }

    fn renumber(&mut self) {
        for (position, prize) in self.prizes.iter_mut().enumerate() {
            prize.rank = rank_at(position);
        }
    }
}

impl<'a> IntoIterator for &'a PrizeRanking {
    type Item = &'a Prize;
    type IntoIter = std::slice::Iter<'a, Prize>;

    fn into_iter(self) -> Self::IntoIter {
        self.prizes.iter()
    }
}
