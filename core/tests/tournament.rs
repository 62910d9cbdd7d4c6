use gambit_core::{
    db::Db,
    lifecycle::{Controller, RoundOutcome},
    message::CompleteMatch,
    pairing::PairingHistory,
    player::{PlayerId, PlayerStatus, TournamentPlayer},
    rating::PlayerRatingState,
    tournament::{TournamentId, TournamentRoundState},
    Error,
};
use std::collections::{HashMap, HashSet};

const PLAYERS: i64 = 9;
const ROUNDS: u32 = 4;

fn roster() -> impl Iterator<Item = TournamentPlayer> {
    (1..=PLAYERS).map(|i| {
        TournamentPlayer::new(PlayerRatingState::new(
            PlayerId::from(i),
            2100.0 - 37.0 * i as f64,
            90.0 + 10.0 * i as f64,
            0.06,
        ))
    })
}

/// Every active player appears exactly once in a freshly paired round.
fn check_round(state: &TournamentRoundState, round: u32) {
    let matches = state.matches_in_round(round).collect::<Vec<_>>();
    let active = state.active_count();
    assert_eq!(matches.len(), active.div_ceil(2), "round {round}");

    let mut seen = HashSet::new();
    for game in &matches {
        for player in game.players() {
            assert!(seen.insert(player), "player {player} paired twice in round {round}");
            assert!(state.participant(player).unwrap().is_active());
        }
    }
    assert_eq!(seen.len(), active);
    assert_eq!(
        matches.iter().filter(|game| game.is_bye()).count(),
        active % 2
    );
}

/// Decide every scheduled match of the current round: the higher-numbered player wins on even
/// match ids, odd ids are drawn.
async fn play_round(controller: &Controller, id: TournamentId, round: u32) {
    for game in controller.matches(id, Some(round)).await.unwrap() {
        if !game.is_scheduled() {
            continue;
        }
        let (a, b) = (game.player1_id, game.player2_id.unwrap());
        let claim = if i64::from(game.id) % 2 == 0 {
            CompleteMatch::win(a.max(b), a.min(b))
        } else {
            CompleteMatch::draw()
        };
        controller
            .complete_match(game.id, &claim, &HashMap::new())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_tournament_survives_restart() {
    let id = TournamentId::from(3);
    let mut db = Db::memory().await.unwrap();

    let controller = Controller::default();
    controller
        .register(TournamentRoundState::new(
            id,
            PlayerId::from(1000),
            ROUNDS,
            roster(),
        ))
        .await
        .unwrap();
    controller.run_matchmaking(id).await.unwrap();
    check_round(&controller.snapshot(id).await.unwrap(), 1);
    play_round(&controller, id, 1).await;
    db.save(&controller.snapshot(id).await.unwrap()).await.unwrap();

    // Carry on from the journal with a fresh controller.
    let controller = Controller::default();
    controller.restore(db.load_all().await.unwrap()).await;

    for round in 2..=ROUNDS {
        let outcome = controller.prepare_next_round(id).await.unwrap();
        let RoundOutcome::Scheduled { round: paired, .. } = &outcome else {
            panic!("round {round} was not paired: {outcome:?}");
        };
        assert_eq!(*paired, round);
        let state = controller.snapshot(id).await.unwrap();
        check_round(&state, round);

        // No pair repeats an earlier round.
        let earlier = PairingHistory::from_matches(
            state.matches().filter(|game| game.round_number < round),
        );
        for game in state.matches_in_round(round) {
            if let Some(opponent) = game.player2_id {
                assert!(!earlier.have_met(game.player1_id, opponent));
            }
        }

        play_round(&controller, id, round).await;
        db.save(&controller.snapshot(id).await.unwrap()).await.unwrap();
    }

    assert_eq!(
        controller.prepare_next_round(id).await.unwrap(),
        RoundOutcome::ReadyToFinalize { round: ROUNDS }
    );

    let state = controller.snapshot(id).await.unwrap();
    let total = state.participants().map(|p| p.points).sum::<f64>();
    // Every played match hands out one point, and so does every bye.
    assert_eq!(total, state.matches().count() as f64);
    for player in state.participants() {
        assert_eq!(player.rounds_played, ROUNDS);
    }

    let standings = controller.finalize_tournament(id).await.unwrap();
    assert_eq!(standings.len(), PLAYERS as usize);
    assert_eq!(standings[0].status, PlayerStatus::Winner);
    assert_eq!(standings[3].status, PlayerStatus::Finalist);
    assert_eq!(standings[8].status, PlayerStatus::Eliminated);
    for (i, standing) in standings.iter().enumerate() {
        assert_eq!(standing.rank, i + 1);
    }

    db.save(&controller.snapshot(id).await.unwrap()).await.unwrap();
    let journaled = db.load_all().await.unwrap();
    assert_eq!(journaled, vec![controller.snapshot(id).await.unwrap()]);
    assert!(journaled[0].is_finalized());

    let err = controller.finalize_tournament(id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err}");
}
