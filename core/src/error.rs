use crate::{game::MatchId, player::PlayerId, rating::RatingError, tournament::TournamentId};
use itertools::Itertools;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure an operation on a tournament can report.
///
/// Each variant is a distinct condition at the boundary; the message is the human-readable reason.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    NotFound(NotFound),

    /// The operation is not valid in the current state of the match or round.
    #[error("{0}")]
    InvalidState(String),

    /// The roster cannot satisfy the constraints of the operation.
    #[error("{0}")]
    Ineligible(String),

    #[error("caller {caller} may not manage tournament {tournament}")]
    Unauthorized {
        caller: PlayerId,
        tournament: TournamentId,
    },

    /// A collaborator call failed or timed out.
    #[error("downstream call failed: {0:#}")]
    Downstream(anyhow::Error),

    /// The result was recorded but the rating of `players` could not be updated; they are flagged
    /// for reconciliation.
    #[error(
        "rating computation failed for player(s) {}: {source}",
        .players.iter().join(", ")
    )]
    Computation {
        players: Vec<PlayerId>,
        source: RatingError,
    },

    /// The journal could not record a committed transition.
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotFound {
    #[error("match {0} not found")]
    Match(MatchId),
    #[error("tournament {0} not found")]
    Tournament(TournamentId),
    #[error("tournament {tournament} does not have round {round}")]
    Round { tournament: TournamentId, round: u32 },
    #[error("player {player} is not registered in tournament {tournament}")]
    Player {
        tournament: TournamentId,
        player: PlayerId,
    },
}

impl From<NotFound> for Error {
    fn from(err: NotFound) -> Self {
        Self::NotFound(err)
    }
}

impl Error {
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }

    /// A short, stable name for the kind of failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Ineligible(_) => "ineligible",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Downstream(_) => "downstream",
            Self::Computation { .. } => "computation",
            Self::Storage(_) => "storage",
        }
    }
}
