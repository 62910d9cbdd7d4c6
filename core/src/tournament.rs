use crate::{
    game::{Match, MatchId},
    player::{PlayerId, PlayerProfile, PlayerStatus, TournamentPlayer},
};
use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

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
pub struct TournamentId(i64);

/// Tournament configuration as reported by the tournament metadata service.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TournamentInfo {
    pub id: TournamentId,
    pub admin_id: PlayerId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub format: String,
    pub max_rounds: u32,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub required_gender: Option<String>,
    /// Registered players.
    #[serde(default)]
    pub participants: Vec<PlayerId>,
}

impl TournamentInfo {
    /// Check that `player` may take part in this tournament, returning the reason if not.
    pub fn check_eligibility(&self, player: &PlayerProfile) -> Result<(), String> {
        if player.blacklisted {
            return Err(format!(
                "player {} is blacklisted from participating in tournaments",
                player.player_id()
            ));
        }
        let rating = player.rating.rating;
        if self.min_rating.is_some_and(|min| rating < min)
            || self.max_rating.is_some_and(|max| rating > max)
        {
            return Err(format!(
                "player {} does not meet the rating requirements",
                player.player_id()
            ));
        }
        if let Some(age) = player.age {
            if self.min_age.is_some_and(|min| age < min) {
                return Err(format!(
                    "player {} does not meet the minimum age requirement",
                    player.player_id()
                ));
            }
            if self.max_age.is_some_and(|max| age > max) {
                return Err(format!(
                    "player {} does not meet the maximum age requirement",
                    player.player_id()
                ));
            }
        }
        if let Some(required) = &self.required_gender {
            let matches = player
                .gender
                .as_deref()
                .is_some_and(|gender| gender.eq_ignore_ascii_case(required));
            if !required.eq_ignore_ascii_case("any") && !matches {
                return Err(format!(
                    "player {} does not meet the gender requirement",
                    player.player_id()
                ));
            }
        }
        Ok(())
    }
}

/// Everything the lifecycle controller owns for one tournament.
#[derive(Clone, Debug, PartialEq)]
pub struct TournamentRoundState {
    pub(crate) id: TournamentId,
    pub(crate) admin_id: PlayerId,
    pub(crate) current_round: u32,
    pub(crate) max_rounds: u32,
    pub(crate) finalized: bool,
    pub(crate) participants: BTreeMap<PlayerId, TournamentPlayer>,
    pub(crate) matches: BTreeMap<MatchId, Match>,
}

impl TournamentRoundState {
    /// A tournament that has not started yet.
    pub fn new(
        id: TournamentId,
        admin_id: PlayerId,
        max_rounds: u32,
        participants: impl IntoIterator<Item = TournamentPlayer>,
    ) -> Self {
        Self::restore(id, admin_id, 0, max_rounds, false, participants, [])
    }

    /// Reassemble a tournament from its journaled parts.
    pub fn restore(
        id: TournamentId,
        admin_id: PlayerId,
        current_round: u32,
        max_rounds: u32,
        finalized: bool,
        participants: impl IntoIterator<Item = TournamentPlayer>,
        matches: impl IntoIterator<Item = Match>,
    ) -> Self {
        Self {
            id,
            admin_id,
            current_round,
            max_rounds,
            finalized,
            participants: participants
                .into_iter()
                .map(|player| (player.player_id, player))
                .collect(),
            matches: matches.into_iter().map(|game| (game.id, game)).collect(),
        }
    }

    pub fn id(&self) -> TournamentId {
        self.id
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn participants(&self) -> impl Iterator<Item = &TournamentPlayer> {
        self.participants.values()
    }

    pub fn participant(&self, player: PlayerId) -> Option<&TournamentPlayer> {
        self.participants.get(&player)
    }

    pub fn matches(&self) -> impl Iterator<Item = &Match> {
        self.matches.values()
    }

    pub fn matches_in_round(&self, round: u32) -> impl Iterator<Item = &Match> {
        self.matches
            .values()
            .filter(move |game| game.round_number == round)
    }

    pub fn active_count(&self) -> usize {
        self.participants().filter(|p| p.is_active()).count()
    }

    /// Matches still awaiting a result, in any round.
    pub fn pending_matches(&self) -> impl Iterator<Item = &Match> {
        self.matches().filter(|game| game.is_scheduled())
    }

    pub(crate) fn set_status(&mut self, player: PlayerId, status: PlayerStatus) {
        if let Some(participant) = self.participants.get_mut(&player) {
            participant.status = status;
        }
    }
}
