//! Drives tournaments from the boundary.
//!
//! For every request the orchestrator checks that the caller administers the tournament, gathers
//! what it needs from the collaborators, lets the controller commit the transition, journals the
//! result, and then tells the rest of the world. Nothing that was committed is rolled back:
//! notification failures are only logged, and a rating that cannot be computed or pushed is
//! reported to the caller after the match result has already been recorded.

use crate::{Notifier, PlayerDirectory, TournamentDirectory};
use futures::future::{join_all, try_join_all};
use gambit_core::{
    db::Db,
    error::{Error, Result},
    game::{Match, MatchId},
    lifecycle::{Controller, RoundOutcome},
    message::{CompleteMatch, MatchSummary, Notice, ResultEntry, RoundReport, Standings},
    player::{PlayerId, PlayerStatus, TournamentPlayer},
    rating::PlayerRatingState,
    tournament::{TournamentId, TournamentInfo, TournamentRoundState},
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::sleep};
use tracing::instrument;

#[derive(Clone, Copy, Debug)]
pub struct OrchestratorConfig {
    /// How many times a rating push is attempted before giving up.
    pub push_attempts: usize,
    /// Delay before the first retry; grows linearly with each attempt.
    pub push_backoff: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            push_attempts: 3,
            push_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug)]
pub struct Orchestrator<P, T, N> {
    controller: Controller,
    db: Arc<Mutex<Db>>,
    players: P,
    tournaments: T,
    notifier: N,
    config: OrchestratorConfig,
}

impl<P, T, N> Orchestrator<P, T, N>
where
    P: PlayerDirectory + Sync,
    T: TournamentDirectory + Sync,
    N: Notifier + Sync,
{
    pub fn new(
        controller: Controller,
        db: Arc<Mutex<Db>>,
        players: P,
        tournaments: T,
        notifier: N,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            controller,
            db,
            players,
            tournaments,
            notifier,
            config,
        }
    }

    /// Reload every journaled tournament. Returns how many were restored.
    pub async fn restore(&self) -> Result<usize> {
        let states = self.db.lock().await.load_all().await.map_err(Error::Storage)?;
        let count = states.len();
        self.controller.restore(states).await;
        tracing::info!(count, "restored tournaments from journal");
        Ok(count)
    }

    /// Start a tournament: load its roster, disqualify ineligible players and pair round 1.
    #[instrument(skip(self))]
    pub async fn run_matchmaking(&self, caller: PlayerId, id: TournamentId) -> Result<Vec<Match>> {
        let info = self.authorize(caller, id).await?;
        if !self.controller.contains(id).await {
            let state = self.roster(&info).await?;
            self.controller.register(state).await?;
        }

        let matches = self.controller.run_matchmaking(id).await?;
        self.journal(id).await?;

        self.announce(&matches).await;
        self.notify_round_advance(id, 1, &matches).await;
        Ok(matches)
    }

    /// Record a match result, update both players' ratings, and push the new ratings.
    #[instrument(skip(self, claim))]
    pub async fn complete_match(
        &self,
        caller: PlayerId,
        id: MatchId,
        claim: &CompleteMatch,
    ) -> Result<MatchSummary> {
        let tournament = self.controller.tournament_of(id).await?;
        self.authorize(caller, tournament).await?;

        let game = self.controller.find_match(id).await?;
        if !game.is_scheduled() {
            return Err(Error::invalid_state(format!(
                "match {id} is already completed"
            )));
        }
        let snapshots = self.snapshots(game.players()).await?;

        let completion = self.controller.complete_match(id, claim, &snapshots).await?;
        self.journal(tournament).await?;

        if let Some(result) = completion.game.result {
            let notice = Notice::MatchCompleted {
                tournament_id: tournament,
                match_id: id,
                result,
                message: result.to_string(),
            };
            if let Err(err) = self.notifier.send_match_notification(&notice).await {
                tracing::warn!(%id, "failed to send match notification: {err:#}");
            }
        }

        let pushes = join_all(
            completion
                .ratings
                .iter()
                .map(|rating| self.push_rating(rating)),
        )
        .await;

        let mut failures = completion.failures.into_iter();
        if let Some((player, source)) = failures.next() {
            let players = std::iter::once(player)
                .chain(failures.map(|(player, _)| player))
                .collect();
            return Err(Error::Computation { players, source });
        }
        pushes.into_iter().collect::<Result<Vec<_>>>()?;

        Ok(MatchSummary {
            game: completion.game,
            players: completion.players,
            ratings: completion.ratings,
            predictions: completion.predictions,
        })
    }

    /// Pair the next round, or report that the tournament is ready to be finalized.
    #[instrument(skip(self))]
    pub async fn prepare_next_round(
        &self,
        caller: PlayerId,
        id: TournamentId,
    ) -> Result<RoundReport> {
        self.authorize(caller, id).await?;
        match self.controller.prepare_next_round(id).await? {
            RoundOutcome::Scheduled { round, matches } => {
                self.journal(id).await?;
                self.announce(&matches).await;
                self.notify_round_advance(id, round, &matches).await;
                Ok(RoundReport::Scheduled { round, matches })
            }
            RoundOutcome::ReadyToFinalize { round } => Ok(RoundReport::ReadyToFinalize { round }),
        }
    }

    #[instrument(skip(self))]
    pub async fn finalize_tournament(
        &self,
        caller: PlayerId,
        id: TournamentId,
    ) -> Result<Standings> {
        self.authorize(caller, id).await?;
        let standings = self.controller.finalize_tournament(id).await?;
        self.journal(id).await?;

        if let Err(err) = self.tournaments.notify_finalized(id, &standings).await {
            tracing::warn!(%id, "failed to report final standings: {err:#}");
        }
        Ok(Standings {
            tournament_id: id,
            finalized: true,
            standings,
        })
    }

    /// Withdraw a player. Players may withdraw themselves; anyone else must be the administrator.
    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        caller: PlayerId,
        id: TournamentId,
        player: PlayerId,
    ) -> Result<TournamentPlayer> {
        if caller != player {
            self.authorize(caller, id).await?;
        }
        let participant = self.controller.withdraw(id, player).await?;
        self.journal(id).await?;
        Ok(participant)
    }

    pub async fn matches(&self, id: TournamentId, round: Option<u32>) -> Result<Vec<Match>> {
        self.controller.matches(id, round).await
    }

    pub async fn match_results(&self, id: TournamentId) -> Result<Vec<ResultEntry>> {
        self.controller.match_results(id).await
    }

    pub async fn standings(&self, id: TournamentId) -> Result<Standings> {
        let (finalized, standings) = self.controller.standings(id).await?;
        Ok(Standings {
            tournament_id: id,
            finalized,
            standings,
        })
    }

    async fn authorize(&self, caller: PlayerId, id: TournamentId) -> Result<TournamentInfo> {
        let info = self
            .tournaments
            .fetch_tournament(id)
            .await
            .map_err(Error::Downstream)?;
        if info.admin_id != caller {
            tracing::warn!(%caller, %id, "rejected request from non-administrator");
            return Err(Error::Unauthorized {
                caller,
                tournament: id,
            });
        }
        Ok(info)
    }

    /// Build the starting state of a tournament from its registered players.
    async fn roster(&self, info: &TournamentInfo) -> Result<TournamentRoundState> {
        let profiles = try_join_all(
            info.participants
                .iter()
                .map(|player| self.players.fetch_player(*player)),
        )
        .await
        .map_err(Error::Downstream)?;

        let players = profiles.into_iter().map(|profile| {
            let mut player = TournamentPlayer::new(profile.rating);
            if let Err(reason) = info.check_eligibility(&profile) {
                tracing::warn!(
                    tournament = %info.id,
                    player = %player.player_id,
                    %reason,
                    "player disqualified"
                );
                player.status = PlayerStatus::Disqualified;
            }
            player
        });
        Ok(TournamentRoundState::new(
            info.id,
            info.admin_id,
            info.max_rounds,
            players,
        ))
    }

    /// Current ratings of `players` from the player directory.
    async fn snapshots(
        &self,
        players: impl Iterator<Item = PlayerId>,
    ) -> Result<HashMap<PlayerId, PlayerRatingState>> {
        let profiles = try_join_all(players.map(|player| self.players.fetch_player(player)))
            .await
            .map_err(Error::Downstream)?;
        Ok(profiles
            .into_iter()
            .map(|profile| (profile.player_id(), profile.rating))
            .collect())
    }

    async fn push_rating(&self, rating: &PlayerRatingState) -> Result<()> {
        let player = rating.player_id;
        let mut attempt = 1;
        loop {
            match self.players.push_rating(rating).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.config.push_attempts => {
                    tracing::warn!(%player, attempt, "failed to push rating, retrying: {err:#}");
                    sleep(self.config.push_backoff * attempt as u32).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(%player, attempt, "failed to push rating: {err:#}");
                    return Err(Error::Downstream(err));
                }
            }
        }
    }

    /// Save the current state of a tournament.
    async fn journal(&self, id: TournamentId) -> Result<()> {
        // The snapshot is taken under the journal lock so that saves land in commit order.
        let mut db = self.db.lock().await;
        let state = self.controller.snapshot(id).await?;
        db.save(&state).await.map_err(Error::Storage)
    }

    /// Tell the players of each newly scheduled match about it.
    async fn announce(&self, matches: &[Match]) {
        let notices = matches
            .iter()
            .filter(|game| game.is_scheduled())
            .map(Notice::scheduled)
            .collect::<Vec<_>>();
        let sent = join_all(
            notices
                .iter()
                .map(|notice| self.notifier.send_match_notification(notice)),
        )
        .await;
        for err in sent.into_iter().filter_map(|res| res.err()) {
            tracing::warn!("failed to send match notification: {err:#}");
        }
    }

    async fn notify_round_advance(&self, id: TournamentId, round: u32, matches: &[Match]) {
        let ids = matches.iter().map(|game| game.id).collect::<Vec<_>>();
        if let Err(err) = self.tournaments.notify_round_advance(id, round, &ids).await {
            tracing::warn!(%id, round, "failed to report round advance: {err:#}");
        }
    }
}
