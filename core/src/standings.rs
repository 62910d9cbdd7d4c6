use crate::{
    game::Match,
    player::{PlayerId, PlayerStatus, TournamentPlayer},
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::HashMap, fmt::Debug};

/// A player's place in the tournament table.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    /// One-based.
    pub rank: usize,
    pub player_id: PlayerId,
    pub points: f64,
    pub rating: f64,
    /// Sum of the points of every opponent faced (byes excluded).
    pub buchholz: f64,
    pub rounds_played: u32,
    pub status: PlayerStatus,
}

/// Orders the tournament table. Players that compare `Less` rank higher.
pub trait TieBreak: Debug + Send + Sync {
    fn compare(&self, a: &Standing, b: &Standing) -> Ordering;
}

/// Points, then rating, then Buchholz, then player id.
#[derive(Clone, Copy, Debug, Default)]
pub struct PointsRatingBuchholz;

impl TieBreak for PointsRatingBuchholz {
    fn compare(&self, a: &Standing, b: &Standing) -> Ordering {
        b.points
            .total_cmp(&a.points)
            .then(b.rating.total_cmp(&a.rating))
            .then(b.buchholz.total_cmp(&a.buchholz))
            .then(a.player_id.cmp(&b.player_id))
    }
}

/// Rank every participant. Participants the tie-break cannot separate keep the order they were
/// given in.
pub fn rank<'a>(
    participants: impl IntoIterator<Item = &'a TournamentPlayer>,
    matches: impl IntoIterator<Item = &'a Match>,
    tie_break: &dyn TieBreak,
) -> Vec<Standing> {
    let participants = participants.into_iter().collect::<Vec<_>>();
    let points = participants
        .iter()
        .map(|player| (player.player_id, player.points))
        .collect::<HashMap<_, _>>();

    let mut buchholz = HashMap::<PlayerId, f64>::new();
    for game in matches {
        for player in game.players() {
            if let Some(opponent) = game.opponent(player) {
                *buchholz.entry(player).or_default() +=
                    points.get(&opponent).copied().unwrap_or_default();
            }
        }
    }

    let mut table = participants
        .iter()
        .map(|player| Standing {
            rank: 0,
            player_id: player.player_id,
            points: player.points,
            rating: player.rating,
            buchholz: buchholz.get(&player.player_id).copied().unwrap_or_default(),
            rounds_played: player.rounds_played,
            status: player.status,
        })
        .collect::<Vec<_>>();
    table.sort_by(|a, b| tie_break.compare(a, b));
    for (i, standing) in table.iter_mut().enumerate() {
        standing.rank = i + 1;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{game::MatchId, rating::PlayerRatingState, tournament::TournamentId};

    fn player(id: i64, rating: f64, points: f64) -> TournamentPlayer {
        let mut player = TournamentPlayer::new(PlayerRatingState::new(
            PlayerId::from(id),
            rating,
            100.0,
            0.06,
        ));
        player.points = points;
        player
    }

    fn game(id: i64, a: i64, b: i64) -> Match {
        Match::scheduled(
            MatchId::from(id),
            TournamentId::from(1),
            1,
            PlayerId::from(a),
            PlayerId::from(b),
        )
    }

    fn order(table: &[Standing]) -> Vec<i64> {
        table.iter().map(|s| s.player_id.into()).collect()
    }

    #[test]
    fn test_points_first() {
        let players = [player(1, 1900.0, 1.0), player(2, 1500.0, 2.0)];
        let table = rank(&players, &[], &PointsRatingBuchholz);
        assert_eq!(order(&table), vec![2, 1]);
        assert_eq!(table[0].rank, 1);
        assert_eq!(table[1].rank, 2);
    }

    #[test]
    fn test_rating_breaks_ties() {
        let players = [player(1, 1500.0, 1.0), player(2, 1600.0, 1.0)];
        let table = rank(&players, &[], &PointsRatingBuchholz);
        assert_eq!(order(&table), vec![2, 1]);
    }

    #[test]
    fn test_buchholz_breaks_remaining_ties() {
        let players = [
            player(1, 1500.0, 1.0),
            player(2, 1500.0, 1.0),
            player(3, 1400.0, 2.0),
            player(4, 1400.0, 0.0),
        ];
        let matches = [game(1, 1, 4), game(2, 2, 3)];
        let table = rank(&players, &matches, &PointsRatingBuchholz);
        assert_eq!(order(&table), vec![3, 2, 1, 4]);
        let two = table.iter().find(|s| s.player_id == PlayerId::from(2)).unwrap();
        assert_eq!(two.buchholz, 2.0);
    }

    #[test]
    fn test_custom_tie_break() {
        #[derive(Debug)]
        struct LowestRatingFirst;

        impl TieBreak for LowestRatingFirst {
            fn compare(&self, a: &Standing, b: &Standing) -> Ordering {
                a.rating.total_cmp(&b.rating)
            }
        }

        let players = [player(1, 1500.0, 1.0), player(2, 1400.0, 1.0)];
        let table = rank(&players, &[], &LowestRatingFirst);
        assert_eq!(order(&table), vec![2, 1]);
    }

    #[test]
    fn test_equal_players_keep_given_order() {
        #[derive(Debug)]
        struct NoPreference;

        impl TieBreak for NoPreference {
            fn compare(&self, _: &Standing, _: &Standing) -> Ordering {
                Ordering::Equal
            }
        }

        let players = (1..=12)
            .map(|id| player(id, 1500.0, 0.0))
            .collect::<Vec<_>>();
        for _ in 0..5 {
            let table = rank(&players, &[], &NoPreference);
            assert_eq!(order(&table), (1..=12).collect::<Vec<_>>());
        }
    }
}
