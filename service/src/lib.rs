//! Tournament progression: the collaborators the service talks to, and the orchestrator which
//! drives the lifecycle controller on their behalf.

use futures::future::Future;
use gambit_core::{
    game::MatchId,
    message::Notice,
    player::{PlayerId, PlayerProfile},
    rating::PlayerRatingState,
    standings::Standing,
    tournament::{TournamentId, TournamentInfo},
};

pub mod http;
pub mod orchestrator;

pub use self::{
    http::{HttpNotifier, HttpPlayerDirectory, HttpTournamentDirectory},
    orchestrator::{Orchestrator, OrchestratorConfig},
};

/// The service holding each player's profile and authoritative rating.
pub trait PlayerDirectory {
    fn fetch_player(
        &self,
        id: PlayerId,
    ) -> impl Future<Output = anyhow::Result<PlayerProfile>> + Send;
    fn push_rating(
        &self,
        rating: &PlayerRatingState,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// The service holding tournament configuration and registrations.
pub trait TournamentDirectory {
    fn fetch_tournament(
        &self,
        id: TournamentId,
    ) -> impl Future<Output = anyhow::Result<TournamentInfo>> + Send;
    fn notify_round_advance(
        &self,
        id: TournamentId,
        round: u32,
        matches: &[MatchId],
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn notify_finalized(
        &self,
        id: TournamentId,
        standings: &[Standing],
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Delivers match notifications to players.
pub trait Notifier {
    fn send_match_notification(
        &self,
        notice: &Notice,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}
