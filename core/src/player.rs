use crate::rating::PlayerRatingState;
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
    Default,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct PlayerId(i64);

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerStatus {
    /// Currently participating.
    Active,
    Eliminated,
    Withdrawn,
    Disqualified,
    Winner,
    RunnerUp,
    ThirdPlace,
    Finalist,
}

impl PlayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Eliminated => "ELIMINATED",
            Self::Withdrawn => "WITHDRAWN",
            Self::Disqualified => "DISQUALIFIED",
            Self::Winner => "WINNER",
            Self::RunnerUp => "RUNNER_UP",
            Self::ThirdPlace => "THIRD_PLACE",
            Self::Finalist => "FINALIST",
        }
    }

    /// The terminal status of the player ranked `place` (zero-based) among active finishers.
    pub fn for_place(place: usize) -> Self {
        match place {
            0 => Self::Winner,
            1 => Self::RunnerUp,
            2 => Self::ThirdPlace,
            3 => Self::Finalist,
            _ => Self::Eliminated,
        }
    }
}

impl std::fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlayerStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "ACTIVE" => Self::Active,
            "ELIMINATED" => Self::Eliminated,
            "WITHDRAWN" => Self::Withdrawn,
            "DISQUALIFIED" => Self::Disqualified,
            "WINNER" => Self::Winner,
            "RUNNER_UP" => Self::RunnerUp,
            "THIRD_PLACE" => Self::ThirdPlace,
            "FINALIST" => Self::Finalist,
            _ => anyhow::bail!("unknown player status {s}"),
        })
    }
}

/// A player as reported by the player directory.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    #[serde(flatten)]
    pub rating: PlayerRatingState,
    pub age: Option<u32>,
    pub gender: Option<String>,
    #[serde(default)]
    pub blacklisted: bool,
}

impl PlayerProfile {
    pub fn player_id(&self) -> PlayerId {
        self.rating.player_id
    }
}

/// A player's standing within one tournament.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TournamentPlayer {
    pub player_id: PlayerId,
    pub rating: f64,
    pub rating_deviation: f64,
    pub volatility: f64,
    pub points: f64,
    pub rounds_played: u32,
    pub status: PlayerStatus,
    /// Set when a rating update for this player could not be computed and the directory still
    /// holds the pre-match rating.
    #[serde(default)]
    pub needs_reconciliation: bool,
}

impl TournamentPlayer {
    pub fn new(rating: PlayerRatingState) -> Self {
        Self {
            player_id: rating.player_id,
            rating: rating.rating,
            rating_deviation: rating.rating_deviation,
            volatility: rating.volatility,
            points: 0.0,
            rounds_played: 0,
            status: PlayerStatus::Active,
            needs_reconciliation: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PlayerStatus::Active
    }

    pub fn rating_state(&self) -> PlayerRatingState {
        PlayerRatingState::new(
            self.player_id,
            self.rating,
            self.rating_deviation,
            self.volatility,
        )
    }

    pub fn set_rating(&mut self, rating: &PlayerRatingState) {
        self.rating = rating.rating;
        self.rating_deviation = rating.rating_deviation;
        self.volatility = rating.volatility;
    }

    /// Credit the points of one finished round.
    pub fn record_round(&mut self, points: f64) {
        self.points += points;
        self.rounds_played += 1;
    }
}
