use crate::{
    game::{Match, MatchId, MatchResult},
    player::{PlayerId, TournamentPlayer},
    rating::PlayerRatingState,
    standings::Standing,
    tournament::TournamentId,
};
use serde::{Deserialize, Serialize};

/// Body of a request to record the result of a match.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMatch {
    #[serde(default)]
    pub winner_id: Option<PlayerId>,
    #[serde(default)]
    pub loser_id: Option<PlayerId>,
    #[serde(default)]
    pub is_draw: bool,
}

impl CompleteMatch {
    pub fn win(winner: PlayerId, loser: PlayerId) -> Self {
        Self {
            winner_id: Some(winner),
            loser_id: Some(loser),
            is_draw: false,
        }
    }

    pub fn draw() -> Self {
        Self {
            is_draw: true,
            ..Default::default()
        }
    }
}

/// Response to a completed match.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    #[serde(rename = "match")]
    pub game: Match,
    /// The players of the match after the result was applied.
    pub players: Vec<TournamentPlayer>,
    /// Ratings computed for this result.
    pub ratings: Vec<PlayerRatingState>,
    /// Each player's predicted score before the match.
    pub predictions: Vec<Prediction>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub player_id: PlayerId,
    pub expected_score: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoundReport {
    /// A new round was paired.
    #[serde(rename_all = "camelCase")]
    Scheduled { round: u32, matches: Vec<Match> },
    /// No further round can be played; the tournament should be finalized.
    #[serde(rename_all = "camelCase")]
    ReadyToFinalize { round: u32 },
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Standings {
    pub tournament_id: TournamentId,
    pub finalized: bool,
    pub standings: Vec<Standing>,
}

/// A recorded result, as listed for a tournament.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub match_id: MatchId,
    pub round_number: u32,
    pub winner_id: Option<PlayerId>,
    pub loser_id: Option<PlayerId>,
    pub is_draw: bool,
}

impl ResultEntry {
    pub fn new(game: &Match) -> Option<Self> {
        let result = game.result?;
        let (winner_id, loser_id) = match result {
            MatchResult::Decisive { winner_id, loser_id } => (Some(winner_id), Some(loser_id)),
            MatchResult::Draw => (None, None),
            MatchResult::Bye { player_id } => (Some(player_id), None),
        };
        Some(Self {
            match_id: game.id,
            round_number: game.round_number,
            winner_id,
            loser_id,
            is_draw: result.is_draw(),
        })
    }
}

/// Outbound notification for the notification and tournament metadata services.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notice {
    /// A match was paired and is waiting to be played.
    #[serde(rename_all = "camelCase")]
    MatchScheduled {
        tournament_id: TournamentId,
        match_id: MatchId,
        round: u32,
        players: Vec<PlayerId>,
    },
    #[serde(rename_all = "camelCase")]
    MatchCompleted {
        tournament_id: TournamentId,
        match_id: MatchId,
        result: MatchResult,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    RoundAdvanced {
        tournament_id: TournamentId,
        round: u32,
        matches: Vec<MatchId>,
    },
    #[serde(rename_all = "camelCase")]
    TournamentFinalized {
        tournament_id: TournamentId,
        standings: Vec<Standing>,
    },
}

impl Notice {
    pub fn scheduled(game: &Match) -> Self {
        Self::MatchScheduled {
            tournament_id: game.tournament_id,
            match_id: game.id,
            round: game.round_number,
            players: game.players().collect(),
        }
    }
}

/// Error body returned at the boundary.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ErrorReport {
    pub error: String,
    pub reason: String,
}

impl From<&crate::Error> for ErrorReport {
    fn from(err: &crate::Error) -> Self {
        Self {
            error: err.kind().into(),
            reason: err.to_string(),
        }
    }
}
