//! The tournament journal.
//!
//! Every committed lifecycle operation saves the full state of the affected tournament, so a
//! restarted service resumes exactly where it left off.

use crate::{
    game::{Match, MatchResult, MatchStatus},
    player::{PlayerId, TournamentPlayer},
    tournament::{TournamentId, TournamentRoundState},
};
use anyhow::Context;
use futures::stream::{StreamExt, TryStreamExt};
use sqlx::{
    migrate, query, query_as,
    sqlite::{Sqlite, SqliteConnectOptions, SqliteConnection},
    ConnectOptions, Connection, Transaction,
};
use std::path::Path;

#[derive(Debug)]
pub struct Db {
    conn: SqliteConnection,
}

impl Db {
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        Self::new(
            SqliteConnectOptions::default()
                .filename(path)
                .create_if_missing(true),
        )
        .await
    }

    pub async fn memory() -> anyhow::Result<Self> {
        Self::new(Default::default()).await
    }

    async fn new(opt: SqliteConnectOptions) -> anyhow::Result<Self> {
        let mut conn = opt.connect().await?;
        migrate!("db/migrations").run(&mut conn).await?;
        Ok(Self { conn })
    }

    /// Replace the journaled copy of a tournament with `state`.
    pub async fn save(&mut self, state: &TournamentRoundState) -> anyhow::Result<()> {
        let id = i64::from(state.id);
        let mut tx = self.conn.begin().await?;

        query(
            "INSERT OR REPLACE INTO tournament (id, admin_id, current_round, max_rounds, finalized)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(i64::from(state.admin_id))
        .bind(state.current_round as i64)
        .bind(state.max_rounds as i64)
        .bind(state.finalized)
        .execute(tx.as_mut())
        .await?;

        for player in state.participants.values() {
            save_participant(&mut tx, state.id, player).await?;
        }
        for game in state.matches.values() {
            save_match(&mut tx, game).await?;
        }

        tx.commit().await?;
        tracing::debug!(%id, round = state.current_round, "journaled tournament");
        Ok(())
    }

    /// Every journaled tournament.
    pub async fn load_all(&mut self) -> anyhow::Result<Vec<TournamentRoundState>> {
        let tournaments: Vec<(i64, i64, i64, i64, bool)> = query_as(
            "SELECT id, admin_id, current_round, max_rounds, finalized FROM tournament ORDER BY id",
        )
        .fetch_all(&mut self.conn)
        .await?;

        let mut states = Vec::with_capacity(tournaments.len());
        for (id, admin_id, current_round, max_rounds, finalized) in tournaments {
            let participants = self.participants(id).await?;
            let matches = self.matches(id).await?;
            states.push(TournamentRoundState::restore(
                id.into(),
                admin_id.into(),
                current_round.try_into()?,
                max_rounds.try_into()?,
                finalized,
                participants,
                matches,
            ));
        }
        Ok(states)
    }

    async fn participants(&mut self, tournament: i64) -> anyhow::Result<Vec<TournamentPlayer>> {
        query_as::<_, (i64, f64, f64, f64, f64, i64, String, bool)>(
            "SELECT player, rating, rating_deviation, volatility, points, rounds_played, status,
                    needs_reconciliation
             FROM participant WHERE tournament = $1 ORDER BY player",
        )
        .bind(tournament)
        .fetch(&mut self.conn)
        .map(|row| -> anyhow::Result<TournamentPlayer> {
            let (player, rating, rating_deviation, volatility, points, rounds_played, status, flag) =
                row?;
            Ok(TournamentPlayer {
                player_id: player.into(),
                rating,
                rating_deviation,
                volatility,
                points,
                rounds_played: rounds_played.try_into()?,
                status: status.parse()?,
                needs_reconciliation: flag,
            })
        })
        .try_collect()
        .await
    }

    async fn matches(&mut self, tournament: i64) -> anyhow::Result<Vec<Match>> {
        type Row = (
            i64,
            i64,
            i64,
            Option<i64>,
            String,
            Option<i64>,
            Option<i64>,
            bool,
        );
        query_as::<_, Row>(
            "SELECT id, round_number, player1, player2, status, winner, loser, is_draw
             FROM game WHERE tournament = $1 ORDER BY id",
        )
        .bind(tournament)
        .fetch(&mut self.conn)
        .map(|row| -> anyhow::Result<Match> {
            let (id, round_number, player1, player2, status, winner, loser, is_draw) = row?;
            let status: MatchStatus = status.parse()?;
            let result = match (status, player2, winner, loser) {
                (MatchStatus::Scheduled, ..) => None,
                (MatchStatus::Completed, None, ..) => Some(MatchResult::Bye {
                    player_id: player1.into(),
                }),
                _ if is_draw => Some(MatchResult::Draw),
                (MatchStatus::Completed, Some(_), Some(winner), Some(loser)) => {
                    Some(MatchResult::Decisive {
                        winner_id: winner.into(),
                        loser_id: loser.into(),
                    })
                }
                _ => anyhow::bail!("completed match {id} has no result"),
            };
            Ok(Match {
                id: id.into(),
                tournament_id: tournament.into(),
                round_number: round_number.try_into()?,
                player1_id: player1.into(),
                player2_id: player2.map(PlayerId::from),
                status,
                result,
            })
        })
        .try_collect()
        .await
    }
}

async fn save_participant<'c>(
    tx: &mut Transaction<'c, Sqlite>,
    tournament: TournamentId,
    player: &TournamentPlayer,
) -> anyhow::Result<()> {
    query(
        "INSERT OR REPLACE INTO participant
            (tournament, player, rating, rating_deviation, volatility, points, rounds_played,
             status, needs_reconciliation)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(i64::from(tournament))
    .bind(i64::from(player.player_id))
    .bind(player.rating)
    .bind(player.rating_deviation)
    .bind(player.volatility)
    .bind(player.points)
    .bind(player.rounds_played as i64)
    .bind(player.status.as_str())
    .bind(player.needs_reconciliation)
    .execute(tx.as_mut())
    .await
    .with_context(|| format!("saving player {} of tournament {tournament}", player.player_id))?;
    Ok(())
}

async fn save_match<'c>(tx: &mut Transaction<'c, Sqlite>, game: &Match) -> anyhow::Result<()> {
    let (winner, loser) = match game.result.and_then(|result| result.winner_loser()) {
        Some((winner, loser)) => (Some(i64::from(winner)), Some(i64::from(loser))),
        None => (None, None),
    };
    query(
        "INSERT OR REPLACE INTO game
            (id, tournament, round_number, player1, player2, status, winner, loser, is_draw)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(i64::from(game.id))
    .bind(i64::from(game.tournament_id))
    .bind(game.round_number as i64)
    .bind(i64::from(game.player1_id))
    .bind(game.player2_id.map(i64::from))
    .bind(game.status.as_str())
    .bind(winner)
    .bind(loser)
    .bind(game.result.is_some_and(|result| result.is_draw()))
    .execute(tx.as_mut())
    .await
    .with_context(|| format!("saving match {}", game.id))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{game::MatchId, player::PlayerStatus, rating::PlayerRatingState};

    fn state() -> TournamentRoundState {
        let players = (1..=3).map(|i| {
            TournamentPlayer::new(PlayerRatingState::new(
                PlayerId::from(i),
                1500.0 + i as f64,
                120.0,
                0.06,
            ))
        });
        let tournament = TournamentId::from(7);
        let mut decided = Match::scheduled(
            MatchId::from(1),
            tournament,
            1,
            PlayerId::from(1),
            PlayerId::from(2),
        );
        decided.status = MatchStatus::Completed;
        decided.result = Some(MatchResult::Decisive {
            winner_id: PlayerId::from(2),
            loser_id: PlayerId::from(1),
        });
        let bye = Match::bye(MatchId::from(2), tournament, 1, PlayerId::from(3));
        let mut drawn = Match::scheduled(
            MatchId::from(3),
            tournament,
            2,
            PlayerId::from(2),
            PlayerId::from(3),
        );
        drawn.status = MatchStatus::Completed;
        drawn.result = Some(MatchResult::Draw);
        let pending = Match::scheduled(
            MatchId::from(4),
            tournament,
            2,
            PlayerId::from(1),
            PlayerId::from(3),
        );

        let mut state = TournamentRoundState::restore(
            tournament,
            PlayerId::from(100),
            2,
            4,
            false,
            players,
            [decided, bye, drawn, pending],
        );
        state.set_status(PlayerId::from(1), PlayerStatus::Withdrawn);
        if let Some(player) = state.participants.get_mut(&PlayerId::from(2)) {
            player.record_round(1.0);
            player.needs_reconciliation = true;
        }
        state
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let mut db = Db::memory().await.unwrap();
        assert!(db.load_all().await.unwrap().is_empty());

        let mut state = state();
        db.save(&state).await.unwrap();
        assert_eq!(db.load_all().await.unwrap(), vec![state.clone()]);

        // Saving again overwrites the journaled copy.
        state.finalized = true;
        state.current_round = 3;
        db.save(&state).await.unwrap();
        assert_eq!(db.load_all().await.unwrap(), vec![state]);
    }
}
