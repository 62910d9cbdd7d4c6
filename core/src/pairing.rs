//! Pairing players for a round.
//!
//! Active players are seeded (by rating, or by score then rating). When the roster is odd the
//! lowest seed who can sit out without forcing a rematch takes the bye, and the rest are paired with their nearest neighbour in seeding
//! order who they have not met yet. Rematches are only accepted when no rematch-free assignment
//! exists.

use crate::{
    game::Match,
    player::{PlayerId, TournamentPlayer},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::HashSet};
use thiserror::Error;

/// Upper bound on the number of candidate pairings examined while looking for an assignment
/// without rematches.
const SEARCH_BUDGET: usize = 10_000;

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Seeding {
    /// Highest current rating first.
    #[default]
    Rating,
    /// Most tournament points first, then highest rating (Swiss order).
    Score,
}

impl Seeding {
    fn compare(&self, a: &TournamentPlayer, b: &TournamentPlayer) -> Ordering {
        let by_rating = b.rating.total_cmp(&a.rating);
        let order = match self {
            Self::Rating => by_rating,
            Self::Score => b.points.total_cmp(&a.points).then(by_rating),
        };
        order.then(a.player_id.cmp(&b.player_id))
    }
}

impl std::str::FromStr for Seeding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "rating" => Ok(Self::Rating),
            "score" => Ok(Self::Score),
            _ => anyhow::bail!("unknown seeding {s}, expected `rating` or `score`"),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PairingError {
    #[error("cannot pair a round with {0} active players; the tournament must be finalized")]
    NotEnoughPlayers(usize),
}

/// Who has already met whom, and who has already sat out, in a tournament.
#[derive(Clone, Debug, Default)]
pub struct PairingHistory {
    opponents: HashSet<(PlayerId, PlayerId)>,
    byes: HashSet<PlayerId>,
}

impl PairingHistory {
    pub fn from_matches<'a>(matches: impl IntoIterator<Item = &'a Match>) -> Self {
        let mut history = Self::default();
        for game in matches {
            match game.player2_id {
                Some(opponent) => history.record(game.player1_id, opponent),
                None => {
                    history.byes.insert(game.player1_id);
                }
            }
        }
        history
    }

    pub fn record(&mut self, a: PlayerId, b: PlayerId) {
        self.opponents.insert(key(a, b));
    }

    pub fn have_met(&self, a: PlayerId, b: PlayerId) -> bool {
        self.opponents.contains(&key(a, b))
    }

    pub fn had_bye(&self, player: PlayerId) -> bool {
        self.byes.contains(&player)
    }
}

fn key(a: PlayerId, b: PlayerId) -> (PlayerId, PlayerId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// One match of a round to be: two players, or one player and a bye.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pairing {
    pub player1: PlayerId,
    pub player2: Option<PlayerId>,
}

impl Pairing {
    pub fn is_bye(&self) -> bool {
        self.player2.is_none()
    }
}

/// Pair the active `participants` for the next round.
///
/// The result holds exactly `ceil(active / 2)` pairings, in seeding order, with the bye (if any)
/// last.
pub fn pair_round<'a>(
    participants: impl IntoIterator<Item = &'a TournamentPlayer>,
    history: &PairingHistory,
    seeding: Seeding,
) -> Result<Vec<Pairing>, PairingError> {
    let seeded = participants
        .into_iter()
        .filter(|player| player.is_active())
        .sorted_by(|a, b| seeding.compare(a, b))
        .map(|player| player.player_id)
        .collect::<Vec<_>>();
    if seeded.len() < 2 {
        return Err(PairingError::NotEnoughPlayers(seeded.len()));
    }

    if seeded.len() % 2 == 0 {
        let pairs = pair_pool(&seeded, history);
        return Ok(pairings(pairs, None));
    }

    // Bye candidates from the lowest seed upward, those who have not sat out yet first. The first
    // candidate whose removal leaves a rematch-free pool takes the bye.
    let (fresh, repeat): (Vec<_>, Vec<_>) = seeded
        .iter()
        .copied()
        .rev()
        .partition(|player| !history.had_bye(*player));
    for bye in fresh.iter().chain(&repeat) {
        let pool = seeded
            .iter()
            .copied()
            .filter(|player| player != bye)
            .collect::<Vec<_>>();
        let mut budget = SEARCH_BUDGET;
        if let Some(pairs) = search(&pool, history, &mut budget) {
            return Ok(pairings(pairs, Some(*bye)));
        }
    }

    let bye = fresh.first().or(repeat.first()).copied();
    let pool = seeded
        .into_iter()
        .filter(|player| Some(*player) != bye)
        .collect::<Vec<_>>();
    tracing::debug!(
        players = pool.len(),
        "no rematch-free pairing found, allowing rematches"
    );
    Ok(pairings(greedy(&pool, history), bye))
}

/// Pair an even pool, without rematches if at all possible.
fn pair_pool(pool: &[PlayerId], history: &PairingHistory) -> Vec<(PlayerId, PlayerId)> {
    let mut budget = SEARCH_BUDGET;
    match search(pool, history, &mut budget) {
        Some(pairs) => pairs,
        None => {
            tracing::debug!(
                players = pool.len(),
                "no rematch-free pairing found, allowing rematches"
            );
            greedy(pool, history)
        }
    }
}

fn pairings(pairs: Vec<(PlayerId, PlayerId)>, bye: Option<PlayerId>) -> Vec<Pairing> {
    pairs
        .into_iter()
        .map(|(player1, player2)| Pairing {
            player1,
            player2: Some(player2),
        })
        .chain(bye.map(|player1| Pairing {
            player1,
            player2: None,
        }))
        .collect()
}

/// Depth-first search for a rematch-free assignment, preferring the nearest seed at each step.
fn search(
    pool: &[PlayerId],
    history: &PairingHistory,
    budget: &mut usize,
) -> Option<Vec<(PlayerId, PlayerId)>> {
    let Some((&first, rest)) = pool.split_first() else {
        return Some(vec![]);
    };
    for (i, &candidate) in rest.iter().enumerate() {
        if history.have_met(first, candidate) {
            continue;
        }
        if *budget == 0 {
            return None;
        }
        *budget -= 1;

        let remaining = rest[..i]
            .iter()
            .chain(&rest[i + 1..])
            .copied()
            .collect::<Vec<_>>();
        if let Some(mut pairs) = search(&remaining, history, budget) {
            pairs.insert(0, (first, candidate));
            return Some(pairs);
        }
    }
    None
}

/// Pair each player with the nearest unpaired seed they have not met, or failing that the nearest
/// unpaired seed.
fn greedy(pool: &[PlayerId], history: &PairingHistory) -> Vec<(PlayerId, PlayerId)> {
    let mut unpaired = pool.to_vec();
    let mut pairs = Vec::with_capacity(pool.len() / 2);
    while unpaired.len() >= 2 {
        let first = unpaired.remove(0);
        let index = unpaired
            .iter()
            .position(|candidate| !history.have_met(first, *candidate))
            .unwrap_or(0);
        pairs.push((first, unpaired.remove(index)));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        game::MatchId, player::PlayerStatus, rating::PlayerRatingState, tournament::TournamentId,
    };

    fn player(id: i64, rating: f64) -> TournamentPlayer {
        TournamentPlayer::new(PlayerRatingState::new(
            PlayerId::from(id),
            rating,
            100.0,
            0.06,
        ))
    }

    fn roster(n: i64) -> Vec<TournamentPlayer> {
        (1..=n).map(|id| player(id, 2000.0 - 50.0 * id as f64)).collect()
    }

    fn ids(pairings: &[Pairing]) -> Vec<(i64, Option<i64>)> {
        pairings
            .iter()
            .map(|p| (p.player1.into(), p.player2.map(i64::from)))
            .collect()
    }

    #[test]
    fn test_pairs_adjacent_by_rating() {
        let mut players = roster(4);
        players.reverse();
        let pairings = pair_round(&players, &PairingHistory::default(), Seeding::Rating).unwrap();
        assert_eq!(ids(&pairings), vec![(1, Some(2)), (3, Some(4))]);
    }

    #[test]
    fn test_odd_roster_gives_lowest_rated_a_bye() {
        let players = roster(9);
        let pairings = pair_round(&players, &PairingHistory::default(), Seeding::Rating).unwrap();
        assert_eq!(pairings.len(), 5);
        let byes = pairings.iter().filter(|p| p.is_bye()).collect::<Vec<_>>();
        assert_eq!(byes.len(), 1);
        assert_eq!(byes[0].player1, PlayerId::from(9));
        assert_eq!(pairings.iter().filter(|p| !p.is_bye()).count(), 4);
    }

    #[test]
    fn test_bye_skips_previous_recipient() {
        let players = roster(5);
        let previous = Match::bye(MatchId::from(1), TournamentId::from(1), 1, PlayerId::from(5));
        let history = PairingHistory::from_matches([&previous]);
        let pairings = pair_round(&players, &history, Seeding::Rating).unwrap();
        assert_eq!(pairings.last().unwrap().player1, PlayerId::from(4));
        assert!(pairings.last().unwrap().is_bye());
    }

    #[test]
    fn test_avoids_rematch() {
        let players = roster(4);
        let mut history = PairingHistory::default();
        history.record(PlayerId::from(1), PlayerId::from(2));
        history.record(PlayerId::from(3), PlayerId::from(4));
        let pairings = pair_round(&players, &history, Seeding::Rating).unwrap();
        assert_eq!(ids(&pairings), vec![(1, Some(3)), (2, Some(4))]);
    }

    #[test]
    fn test_backtracks_to_avoid_rematch() {
        // Greedy would pair 1-3 and then be stuck with the 2-4 rematch.
        let players = roster(4);
        let mut history = PairingHistory::default();
        history.record(PlayerId::from(1), PlayerId::from(2));
        history.record(PlayerId::from(2), PlayerId::from(4));
        let pairings = pair_round(&players, &history, Seeding::Rating).unwrap();
        assert_eq!(ids(&pairings), vec![(1, Some(4)), (2, Some(3))]);
    }

    #[test]
    fn test_bye_moves_up_to_avoid_rematch() {
        // Giving 3 the bye would leave only the 1-2 rematch.
        let players = roster(3);
        let mut history = PairingHistory::default();
        history.record(PlayerId::from(1), PlayerId::from(2));
        let pairings = pair_round(&players, &history, Seeding::Rating).unwrap();
        assert_eq!(ids(&pairings), vec![(1, Some(3)), (2, None)]);
    }

    #[test]
    fn test_odd_roster_never_rematches_when_avoidable() {
        // Round one of a five player event: 1-2, 3-4, bye 5.
        let players = roster(5);
        let t = TournamentId::from(1);
        let game = |id: i64, a: i64, b: i64| {
            Match::scheduled(MatchId::from(id), t, 1, PlayerId::from(a), PlayerId::from(b))
        };
        let round = [
            game(1, 1, 2),
            game(2, 3, 4),
            Match::bye(MatchId::from(3), t, 1, PlayerId::from(5)),
        ];
        let history = PairingHistory::from_matches(&round);
        let pairings = pair_round(&players, &history, Seeding::Rating).unwrap();
        assert_eq!(pairings.len(), 3);
        for pairing in &pairings {
            if let Some(opponent) = pairing.player2 {
                assert!(!history.have_met(pairing.player1, opponent), "{pairing:?}");
            }
        }
        let bye = pairings.iter().find(|p| p.is_bye()).unwrap();
        assert_ne!(bye.player1, PlayerId::from(5));
    }

    #[test]
    fn test_rematch_with_odd_roster_keeps_lowest_bye() {
        // Everyone has met everyone, so the lowest seed sits out as usual.
        let players = roster(3);
        let mut history = PairingHistory::default();
        history.record(PlayerId::from(1), PlayerId::from(2));
        history.record(PlayerId::from(1), PlayerId::from(3));
        history.record(PlayerId::from(2), PlayerId::from(3));
        let pairings = pair_round(&players, &history, Seeding::Rating).unwrap();
        assert_eq!(ids(&pairings), vec![(1, Some(2)), (3, None)]);
    }

    #[test]
    fn test_allows_rematch_without_alternative() {
        let players = roster(2);
        let mut history = PairingHistory::default();
        history.record(PlayerId::from(1), PlayerId::from(2));
        let pairings = pair_round(&players, &history, Seeding::Rating).unwrap();
        assert_eq!(ids(&pairings), vec![(1, Some(2))]);
    }

    #[test]
    fn test_score_seeding() {
        let mut players = roster(4);
        players[3].points = 2.0;
        players[2].points = 1.0;
        let pairings = pair_round(&players, &PairingHistory::default(), Seeding::Score).unwrap();
        assert_eq!(ids(&pairings), vec![(4, Some(3)), (1, Some(2))]);
    }

    #[test]
    fn test_skips_inactive_players() {
        let mut players = roster(4);
        players[0].status = PlayerStatus::Withdrawn;
        let pairings = pair_round(&players, &PairingHistory::default(), Seeding::Rating).unwrap();
        assert_eq!(ids(&pairings), vec![(2, Some(3)), (4, None)]);
    }

    #[test]
    fn test_not_enough_players() {
        let players = roster(1);
        assert_eq!(
            pair_round(&players, &PairingHistory::default(), Seeding::Rating),
            Err(PairingError::NotEnoughPlayers(1))
        );
    }

    #[test]
    fn test_match_count() {
        for n in 2..=15 {
            let pairings =
                pair_round(&roster(n), &PairingHistory::default(), Seeding::Rating).unwrap();
            assert_eq!(pairings.len(), (n as usize).div_ceil(2));
        }
    }
}
