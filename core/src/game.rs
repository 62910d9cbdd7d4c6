use crate::{player::PlayerId, tournament::TournamentId};
use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};

#[derive(
    Clone,
    Copy,
    Deserialize,
    Serialize,
    Debug,
    Display,
    From,
    FromStr,
    Into,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct MatchId(i64);

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Scheduled,
    Completed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Completed => "COMPLETED",
        }
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "SCHEDULED" => Ok(Self::Scheduled),
            "COMPLETED" => Ok(Self::Completed),
            _ => anyhow::bail!("unknown match status {s}"),
        }
    }
}

/// How a match ended. Set exactly once.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MatchResult {
    #[serde(rename_all = "camelCase")]
    Decisive { winner_id: PlayerId, loser_id: PlayerId },
    Draw,
    /// The match had no opponent; the player is credited with a win.
    #[serde(rename_all = "camelCase")]
    Bye { player_id: PlayerId },
}

impl MatchResult {
    /// The winning and losing players, if the result is decisive.
    pub fn winner_loser(&self) -> Option<(PlayerId, PlayerId)> {
        match self {
            Self::Decisive { winner_id, loser_id } => Some((*winner_id, *loser_id)),
            _ => None,
        }
    }

    pub fn is_draw(&self) -> bool {
        matches!(self, Self::Draw)
    }

    /// Tournament points earned by `player` from this result.
    pub fn points(&self, player: PlayerId) -> f64 {
        self.score(player).unwrap_or(0.0)
    }

    /// The rated score of `player` (1.0, 0.5 or 0.0), or `None` for a bye, which is not rated.
    pub fn score(&self, player: PlayerId) -> Option<f64> {
        match self {
            Self::Decisive { winner_id, .. } if *winner_id == player => Some(1.0),
            Self::Decisive { .. } => Some(0.0),
            Self::Draw => Some(0.5),
            Self::Bye { player_id } if *player_id == player => Some(1.0),
            Self::Bye { .. } => None,
        }
    }
}

impl std::fmt::Display for MatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decisive { winner_id, loser_id } => write!(f, "{winner_id} defeats {loser_id}"),
            Self::Draw => write!(f, "the match is drawn"),
            Self::Bye { player_id } => write!(f, "{player_id} receives a bye"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub round_number: u32,
    pub player1_id: PlayerId,
    /// Absent for a bye.
    pub player2_id: Option<PlayerId>,
    pub status: MatchStatus,
    pub result: Option<MatchResult>,
}

impl Match {
    /// A match between two players, awaiting its result.
    pub fn scheduled(
        id: MatchId,
        tournament_id: TournamentId,
        round_number: u32,
        player1_id: PlayerId,
        player2_id: PlayerId,
    ) -> Self {
        Self {
            id,
            tournament_id,
            round_number,
            player1_id,
            player2_id: Some(player2_id),
            status: MatchStatus::Scheduled,
            result: None,
        }
    }

    /// A bye, which resolves as soon as it is created.
    pub fn bye(id: MatchId, tournament_id: TournamentId, round_number: u32, player: PlayerId) -> Self {
        Self {
            id,
            tournament_id,
            round_number,
            player1_id: player,
            player2_id: None,
            status: MatchStatus::Completed,
            result: Some(MatchResult::Bye { player_id: player }),
        }
    }

    pub fn is_bye(&self) -> bool {
        self.player2_id.is_none()
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == MatchStatus::Scheduled
    }

    pub fn has_player(&self, player: PlayerId) -> bool {
        self.player1_id == player || self.player2_id == Some(player)
    }

    /// The players of this match, first player first.
    pub fn players(&self) -> impl Iterator<Item = PlayerId> {
        std::iter::once(self.player1_id).chain(self.player2_id)
    }

    /// The opponent of `player`, if they are playing in this match and it is not a bye.
    pub fn opponent(&self, player: PlayerId) -> Option<PlayerId> {
        if self.player1_id == player {
            self.player2_id
        } else if self.player2_id == Some(player) {
            Some(self.player1_id)
        } else {
            None
        }
    }
}
