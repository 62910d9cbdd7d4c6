//! The match lifecycle controller.
//!
//! The controller is the single owner of every tournament's round state. Each tournament sits
//! behind its own mutex, so operations on one tournament are serialized (a result can only be
//! committed once, and a round is only prepared after every completion of the previous one has
//! landed) while different tournaments proceed independently.

use crate::{
    error::{Error, NotFound, Result},
    game::{Match, MatchId, MatchResult, MatchStatus},
    message::{CompleteMatch, Prediction, ResultEntry},
    pairing::{self, PairingHistory, Seeding},
    player::{PlayerId, PlayerStatus, TournamentPlayer},
    rating::{Glicko2, PlayerRatingState, RatingError},
    standings::{self, PointsRatingBuchholz, Standing, TieBreak},
    tournament::{TournamentId, TournamentRoundState},
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};
use tokio::sync::{Mutex, RwLock};

/// What preparing the next round led to.
#[derive(Clone, Debug, PartialEq)]
pub enum RoundOutcome {
    Scheduled { round: u32, matches: Vec<Match> },
    /// Every round has been played, or too few players remain; nothing was changed.
    ReadyToFinalize { round: u32 },
}

/// The effect of recording a match result.
#[derive(Clone, Debug)]
pub struct Completion {
    pub game: Match,
    /// Both players of the match, after the result was applied.
    pub players: Vec<TournamentPlayer>,
    /// New ratings to push to the player directory.
    pub ratings: Vec<PlayerRatingState>,
    /// Players whose rating update failed. Their result stands, but their rating must be
    /// reconciled.
    pub failures: Vec<(PlayerId, RatingError)>,
    pub predictions: Vec<Prediction>,
}

#[derive(Debug)]
pub struct Controller {
    tournaments: RwLock<HashMap<TournamentId, Arc<Mutex<TournamentRoundState>>>>,
    match_index: RwLock<HashMap<MatchId, TournamentId>>,
    next_match_id: AtomicI64,
    glicko: Glicko2,
    seeding: Seeding,
    tie_break: Arc<dyn TieBreak>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(Glicko2::default(), Seeding::default())
    }
}

impl Controller {
    pub fn new(glicko: Glicko2, seeding: Seeding) -> Self {
        Self {
            tournaments: Default::default(),
            match_index: Default::default(),
            next_match_id: AtomicI64::new(1),
            glicko,
            seeding,
            tie_break: Arc::new(PointsRatingBuchholz),
        }
    }

    pub fn with_tie_break(mut self, tie_break: impl TieBreak + 'static) -> Self {
        self.tie_break = Arc::new(tie_break);
        self
    }

    /// Take ownership of a new tournament.
    pub async fn register(&self, state: TournamentRoundState) -> Result<()> {
        let mut tournaments = self.tournaments.write().await;
        if tournaments.contains_key(&state.id) {
            return Err(Error::invalid_state(format!(
                "tournament {} is already registered",
                state.id
            )));
        }
        tracing::info!(
            id = %state.id,
            players = state.participants.len(),
            max_rounds = state.max_rounds,
            "registered tournament"
        );
        tournaments.insert(state.id, Arc::new(Mutex::new(state)));
        Ok(())
    }

    /// Reinstall tournaments loaded from the journal, replacing any in-memory copy.
    pub async fn restore(&self, states: impl IntoIterator<Item = TournamentRoundState>) {
        let mut tournaments = self.tournaments.write().await;
        let mut index = self.match_index.write().await;
        for state in states {
            for id in state.matches.keys() {
                index.insert(*id, state.id);
                self.next_match_id
                    .fetch_max(i64::from(*id) + 1, Ordering::SeqCst);
            }
            tracing::debug!(id = %state.id, round = state.current_round, "restored tournament");
            tournaments.insert(state.id, Arc::new(Mutex::new(state)));
        }
    }

    pub async fn contains(&self, id: TournamentId) -> bool {
        self.tournaments.read().await.contains_key(&id)
    }

    async fn tournament(&self, id: TournamentId) -> Result<Arc<Mutex<TournamentRoundState>>> {
        self.tournaments
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| NotFound::Tournament(id).into())
    }

    /// The tournament a match belongs to.
    pub async fn tournament_of(&self, id: MatchId) -> Result<TournamentId> {
        self.match_index
            .read()
            .await
            .get(&id)
            .copied()
            .ok_or_else(|| NotFound::Match(id).into())
    }

    pub async fn find_match(&self, id: MatchId) -> Result<Match> {
        let tournament = self.tournament(self.tournament_of(id).await?).await?;
        let state = tournament.lock().await;
        state
            .matches
            .get(&id)
            .cloned()
            .ok_or_else(|| NotFound::Match(id).into())
    }

    /// A copy of the full state of a tournament.
    pub async fn snapshot(&self, id: TournamentId) -> Result<TournamentRoundState> {
        Ok(self.tournament(id).await?.lock().await.clone())
    }

    /// Pair round 1 of a tournament that has not started yet.
    pub async fn run_matchmaking(&self, id: TournamentId) -> Result<Vec<Match>> {
        let tournament = self.tournament(id).await?;
        let mut state = tournament.lock().await;
        if !state.matches.is_empty() {
            return Err(Error::invalid_state(format!(
                "tournament {id} already has matches"
            )));
        }
        if state.finalized {
            return Err(Error::invalid_state(format!(
                "tournament {id} is finalized"
            )));
        }
        self.schedule_round(&mut state, 1).await
    }

    /// Pair the round after the current one, once every match of the current round is complete.
    pub async fn prepare_next_round(&self, id: TournamentId) -> Result<RoundOutcome> {
        let tournament = self.tournament(id).await?;
        let mut state = tournament.lock().await;
        if state.finalized {
            return Err(Error::invalid_state(format!(
                "tournament {id} is finalized"
            )));
        }
        if state.current_round == 0 {
            return Err(Error::invalid_state(format!(
                "matchmaking has not started for tournament {id}"
            )));
        }
        let pending = state.pending_matches().count();
        if pending > 0 {
            return Err(Error::invalid_state(format!(
                "round {} of tournament {id} still has {pending} scheduled matches",
                state.current_round
            )));
        }

        if state.current_round >= state.max_rounds || state.active_count() < 2 {
            tracing::info!(%id, round = state.current_round, "tournament ready to finalize");
            return Ok(RoundOutcome::ReadyToFinalize {
                round: state.current_round,
            });
        }

        let round = state.current_round + 1;
        let matches = self.schedule_round(&mut state, round).await?;
        Ok(RoundOutcome::Scheduled { round, matches })
    }

    /// Pair `round` and install its matches. Nothing changes if pairing fails.
    async fn schedule_round(
        &self,
        state: &mut TournamentRoundState,
        round: u32,
    ) -> Result<Vec<Match>> {
        let history = PairingHistory::from_matches(state.matches.values());
        let pairings = pairing::pair_round(state.participants.values(), &history, self.seeding)
            .map_err(|err| Error::Ineligible(err.to_string()))?;

        let matches = pairings
            .into_iter()
            .map(|pairing| {
                let id = MatchId::from(self.next_match_id.fetch_add(1, Ordering::SeqCst));
                match pairing.player2 {
                    Some(player2) => Match::scheduled(id, state.id, round, pairing.player1, player2),
                    None => Match::bye(id, state.id, round, pairing.player1),
                }
            })
            .collect::<Vec<_>>();

        let mut index = self.match_index.write().await;
        for game in &matches {
            if game.is_bye() {
                // Byes are excluded from rating and count as a win.
                if let Some(player) = state.participants.get_mut(&game.player1_id) {
                    player.record_round(1.0);
                }
            }
            index.insert(game.id, state.id);
            state.matches.insert(game.id, game.clone());
        }
        state.current_round = round;

        tracing::info!(
            id = %state.id,
            round,
            matches = matches.len(),
            "scheduled round"
        );
        Ok(matches)
    }

    /// Record the result of a scheduled match and rate both players.
    ///
    /// `snapshots` holds the freshest known rating of each player; a player missing from it is
    /// rated from the tournament's own copy.
    pub async fn complete_match(
        &self,
        id: MatchId,
        claim: &CompleteMatch,
        snapshots: &HashMap<PlayerId, PlayerRatingState>,
    ) -> Result<Completion> {
        let tournament = self.tournament(self.tournament_of(id).await?).await?;
        let mut state = tournament.lock().await;

        let game = state
            .matches
            .get(&id)
            .ok_or(NotFound::Match(id))?
            .clone();
        if !game.is_scheduled() {
            return Err(Error::invalid_state(format!(
                "match {id} is already completed"
            )));
        }
        let Some(player2) = game.player2_id else {
            return Err(Error::invalid_state(format!("match {id} is a bye")));
        };
        let result = resolve(&game, claim)?;

        let mut priors = Vec::with_capacity(2);
        for player in [game.player1_id, player2] {
            let participant = state.participants.get(&player).ok_or(NotFound::Player {
                tournament: state.id,
                player,
            })?;
            let prior = snapshots
                .get(&player)
                .copied()
                .unwrap_or_else(|| participant.rating_state());
            priors.push(prior);
        }

        // Both players are rated against the other's rating from before the match.
        let mut ratings = Vec::with_capacity(2);
        let mut failures = vec![];
        let mut predictions = Vec::with_capacity(2);
        for (prior, opponent) in [(priors[0], priors[1]), (priors[1], priors[0])] {
            let player = prior.player_id;
            let score = result.points(player);
            let update = self.glicko.update(&prior, &[(opponent, score)]);
            predictions.push(Prediction {
                player_id: player,
                expected_score: self.glicko.expected_score(&prior, &opponent),
            });

            let Some(participant) = state.participants.get_mut(&player) else {
                continue;
            };
            participant.record_round(score);
            match update {
                Ok(rating) => {
                    participant.set_rating(&rating);
                    ratings.push(rating);
                }
                Err(err) => {
                    tracing::error!(%id, %player, "rating update failed: {err}");
                    participant.needs_reconciliation = true;
                    failures.push((player, err));
                }
            }
        }

        let Some(game) = state.matches.get_mut(&id) else {
            return Err(NotFound::Match(id).into());
        };
        game.status = MatchStatus::Completed;
        game.result = Some(result);
        let game = game.clone();

        tracing::info!(%id, tournament = %state.id, %result, "completed match");
        let players = game
            .players()
            .filter_map(|player| state.participants.get(&player).cloned())
            .collect();
        Ok(Completion {
            game,
            players,
            ratings,
            failures,
            predictions,
        })
    }

    /// Rank the players and assign their final statuses.
    pub async fn finalize_tournament(&self, id: TournamentId) -> Result<Vec<Standing>> {
        let tournament = self.tournament(id).await?;
        let mut state = tournament.lock().await;
        if state.finalized {
            return Err(Error::invalid_state(format!(
                "tournament {id} is already finalized"
            )));
        }
        if state.current_round == 0 {
            return Err(Error::invalid_state(format!(
                "matchmaking has not started for tournament {id}"
            )));
        }
        let pending = state.pending_matches().count();
        if pending > 0 {
            return Err(Error::invalid_state(format!(
                "cannot finalize tournament {id}: {pending} matches are still scheduled"
            )));
        }
        if state.current_round < state.max_rounds && state.active_count() >= 2 {
            return Err(Error::invalid_state(format!(
                "cannot finalize tournament {id}: {} of {} rounds played",
                state.current_round, state.max_rounds
            )));
        }

        let table = standings::rank(
            state.participants.values(),
            state.matches.values(),
            self.tie_break.as_ref(),
        );
        let mut place = 0;
        for standing in &table {
            if standing.status == PlayerStatus::Active {
                state.set_status(standing.player_id, PlayerStatus::for_place(place));
                place += 1;
            }
        }
        state.finalized = true;

        tracing::info!(%id, players = table.len(), "finalized tournament");
        Ok(self.rank(&state))
    }

    /// Withdraw a player from all further rounds.
    pub async fn withdraw(&self, id: TournamentId, player: PlayerId) -> Result<TournamentPlayer> {
        let tournament = self.tournament(id).await?;
        let mut state = tournament.lock().await;
        if state.finalized {
            return Err(Error::invalid_state(format!(
                "tournament {id} is finalized"
            )));
        }
        if state
            .pending_matches()
            .any(|game| game.has_player(player))
        {
            return Err(Error::invalid_state(format!(
                "player {player} has a scheduled match in tournament {id}"
            )));
        }
        let participant = state
            .participants
            .get_mut(&player)
            .ok_or(NotFound::Player {
                tournament: id,
                player,
            })?;
        if participant.status != PlayerStatus::Active {
            return Err(Error::invalid_state(format!(
                "player {player} is {} in tournament {id}",
                participant.status
            )));
        }
        participant.status = PlayerStatus::Withdrawn;
        tracing::info!(%id, %player, "player withdrew");
        Ok(participant.clone())
    }

    /// Matches of a tournament, optionally only those of one round.
    pub async fn matches(&self, id: TournamentId, round: Option<u32>) -> Result<Vec<Match>> {
        let tournament = self.tournament(id).await?;
        let state = tournament.lock().await;
        let Some(round) = round else {
            return Ok(state.matches.values().cloned().collect());
        };
        let matches = state.matches_in_round(round).cloned().collect::<Vec<_>>();
        if matches.is_empty() {
            return Err(NotFound::Round {
                tournament: id,
                round,
            }
            .into());
        }
        Ok(matches)
    }

    /// Results of every completed match of a tournament.
    pub async fn match_results(&self, id: TournamentId) -> Result<Vec<ResultEntry>> {
        let tournament = self.tournament(id).await?;
        let state = tournament.lock().await;
        Ok(state.matches.values().filter_map(ResultEntry::new).collect())
    }

    /// The current tournament table.
    pub async fn standings(&self, id: TournamentId) -> Result<(bool, Vec<Standing>)> {
        let tournament = self.tournament(id).await?;
        let state = tournament.lock().await;
        Ok((state.finalized, self.rank(&state)))
    }

    fn rank(&self, state: &TournamentRoundState) -> Vec<Standing> {
        standings::rank(
            state.participants.values(),
            state.matches.values(),
            self.tie_break.as_ref(),
        )
    }
}

/// Turn a claimed result into a valid result for `game`.
fn resolve(game: &Match, claim: &CompleteMatch) -> Result<MatchResult> {
    if claim.is_draw {
        if claim.winner_id.is_some() || claim.loser_id.is_some() {
            return Err(Error::invalid_state(format!(
                "match {}: a drawn match has no winner or loser",
                game.id
            )));
        }
        return Ok(MatchResult::Draw);
    }

    let (Some(winner_id), Some(loser_id)) = (claim.winner_id, claim.loser_id) else {
        return Err(Error::invalid_state(format!(
            "match {}: a decisive result needs both a winner and a loser",
            game.id
        )));
    };
    if winner_id == loser_id {
        return Err(Error::invalid_state(format!(
            "match {}: player {winner_id} cannot both win and lose",
            game.id
        )));
    }
    for player in [winner_id, loser_id] {
        if !game.has_player(player) {
            return Err(Error::invalid_state(format!(
                "match {}: player {player} is not playing in this match",
                game.id
            )));
        }
    }
    Ok(MatchResult::Decisive {
        winner_id,
        loser_id,
    })
}
