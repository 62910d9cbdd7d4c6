//! The Glicko-2 rating system.
//!
//! Ratings are kept on the familiar Glicko scale (1500 centred, deviation in rating points) and
//! converted to the internal Glicko-2 scale only for the duration of an update. The update follows
//! Glickman's "Example of the Glicko-2 system" step by step, including the Illinois variant of
//! regula falsi for the volatility.

use crate::player::PlayerId;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

/// Conversion factor between the Glicko and Glicko-2 scales (400 / ln 10).
pub const SCALE: f64 = 173.7178;

/// Starting values for a player who has never played a rated game.
pub const DEFAULT_RATING: f64 = 1500.0;
pub const DEFAULT_DEVIATION: f64 = 350.0;
pub const DEFAULT_VOLATILITY: f64 = 0.06;

/// The system constant instantiating the Glicko2 rating system.
///
/// Glicko2 is parameterized by a constant which controls how significantly ratings change with each
/// result. Recommended parameters are in the range 0.3 to 1.2, with lower values causing less
/// volatility.
pub const SYSTEM_CONSTANT: f64 = 0.5;

/// Convergence tolerance of the volatility iteration.
pub const TOLERANCE: f64 = 1e-6;

/// Fail-safe bound on every iterative step of the volatility solver.
pub const MAX_ITERATIONS: usize = 100;

/// A player's rating as held by the player directory.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRatingState {
    pub player_id: PlayerId,
    #[serde(default = "default_rating")]
    pub rating: f64,
    #[serde(default = "default_deviation")]
    pub rating_deviation: f64,
    #[serde(default = "default_volatility")]
    pub volatility: f64,
}

fn default_rating() -> f64 {
    DEFAULT_RATING
}

fn default_deviation() -> f64 {
    DEFAULT_DEVIATION
}

fn default_volatility() -> f64 {
    DEFAULT_VOLATILITY
}

impl PlayerRatingState {
    pub fn new(player_id: PlayerId, rating: f64, rating_deviation: f64, volatility: f64) -> Self {
        Self {
            player_id,
            rating,
            rating_deviation,
            volatility,
        }
    }

    fn mu(&self) -> f64 {
        (self.rating - DEFAULT_RATING) / SCALE
    }

    fn phi(&self) -> f64 {
        self.rating_deviation / SCALE
    }

    fn validate(&self) -> Result<(), RatingError> {
        let finite = self.rating.is_finite()
            && self.rating_deviation.is_finite()
            && self.volatility.is_finite();
        if !finite || self.rating_deviation <= 0.0 || self.volatility <= 0.0 {
            return Err(RatingError::InvalidState(*self));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RatingError {
    #[error("invalid rating state for player {}: {0:?}", .0.player_id)]
    InvalidState(PlayerRatingState),
    #[error("score {0} is outside [0, 1]")]
    InvalidScore(f64),
    #[error("volatility did not converge within {0} iterations")]
    NoConvergence(usize),
    #[error("rating update produced a non-finite value")]
    NonFinite,
}

/// Parameters of the rating system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glicko2 {
    tau: f64,
    tolerance: f64,
    max_iterations: usize,
}

impl Default for Glicko2 {
    fn default() -> Self {
        Self::new(SYSTEM_CONSTANT)
    }
}

impl Glicko2 {
    pub fn new(tau: f64) -> Self {
        Self {
            tau,
            tolerance: TOLERANCE,
            max_iterations: MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Rate `player` over one rating period against `results` (opponent and score from the
    /// player's point of view: 1.0 win, 0.5 draw, 0.0 loss).
    pub fn update(
        &self,
        player: &PlayerRatingState,
        results: &[(PlayerRatingState, f64)],
    ) -> Result<PlayerRatingState, RatingError> {
        player.validate()?;
        let mu = player.mu();
        let phi = player.phi();
        let sigma = player.volatility;

        // A period with no games only widens the deviation.
        if results.is_empty() {
            let phi_star = (phi * phi + sigma * sigma).sqrt();
            return Ok(PlayerRatingState {
                rating_deviation: SCALE * phi_star,
                ..*player
            });
        }

        let mut v_inv = 0.0;
        let mut improvement = 0.0;
        for (opponent, score) in results {
            opponent.validate()?;
            if !(0.0..=1.0).contains(score) {
                return Err(RatingError::InvalidScore(*score));
            }
            let g = g(opponent.phi());
            let e = e(mu, opponent.mu(), opponent.phi());
            v_inv += g * g * e * (1.0 - e);
            improvement += g * (score - e);
        }
        let v = 1.0 / v_inv;
        let delta = v * improvement;

        let sigma_prime = self.volatility(phi, sigma, v, delta)?;
        let phi_star = (phi * phi + sigma_prime * sigma_prime).sqrt();
        let phi_prime = 1.0 / (1.0 / (phi_star * phi_star) + 1.0 / v).sqrt();
        let mu_prime = mu + phi_prime * phi_prime * improvement;

        let next = PlayerRatingState {
            player_id: player.player_id,
            rating: SCALE * mu_prime + DEFAULT_RATING,
            rating_deviation: SCALE * phi_prime,
            volatility: sigma_prime,
        };
        if !(next.rating.is_finite()
            && next.rating_deviation.is_finite()
            && next.volatility.is_finite())
        {
            return Err(RatingError::NonFinite);
        }
        Ok(next)
    }

    /// Solve for the new volatility σ'.
    fn volatility(&self, phi: f64, sigma: f64, v: f64, delta: f64) -> Result<f64, RatingError> {
        let tau = self.tau;
        let a = (sigma * sigma).ln();
        let phi2 = phi * phi;
        let delta2 = delta * delta;
        let f = |x: f64| {
            let ex = x.exp();
            let denom = phi2 + v + ex;
            ex * (delta2 - phi2 - v - ex) / (2.0 * denom * denom) - (x - a) / (tau * tau)
        };

        // Bracket the root.
        let mut big_a = a;
        let mut big_b = if delta2 > phi2 + v {
            (delta2 - phi2 - v).ln()
        } else {
            let mut k = 1.0;
            let mut iterations = 0;
            while f(a - k * tau) < 0.0 {
                iterations += 1;
                if iterations >= self.max_iterations {
                    return Err(RatingError::NoConvergence(self.max_iterations));
                }
                k += 1.0;
            }
            a - k * tau
        };

        let mut f_a = f(big_a);
        let mut f_b = f(big_b);
        let mut iterations = 0;
        while (big_b - big_a).abs() > self.tolerance {
            if iterations >= self.max_iterations {
                return Err(RatingError::NoConvergence(self.max_iterations));
            }
            iterations += 1;

            let big_c = big_a + (big_a - big_b) * f_a / (f_b - f_a);
            let f_c = f(big_c);
            if f_c * f_b <= 0.0 {
                big_a = big_b;
                f_a = f_b;
            } else {
                f_a /= 2.0;
            }
            big_b = big_c;
            f_b = f_c;
            if !big_b.is_finite() {
                return Err(RatingError::NonFinite);
            }
        }

        Ok((big_a / 2.0).exp())
    }

    /// Probability that `player` beats `opponent`, as used in the update.
    pub fn expected_score(&self, player: &PlayerRatingState, opponent: &PlayerRatingState) -> f64 {
        e(player.mu(), opponent.mu(), opponent.phi())
    }
}

fn g(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * phi * phi / (PI * PI)).sqrt()
}

fn e(mu: f64, mu_j: f64, phi_j: f64) -> f64 {
    1.0 / (1.0 + (-g(phi_j) * (mu - mu_j)).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: i64, rating: f64, deviation: f64, volatility: f64) -> PlayerRatingState {
        PlayerRatingState::new(PlayerId::from(id), rating, deviation, volatility)
    }

    fn glickman_player() -> PlayerRatingState {
        state(1, 1500.0, 200.0, 0.06)
    }

    #[test]
    fn test_glickman_worked_example() {
        let results = [
            (state(2, 1400.0, 30.0, 0.06), 1.0),
            (state(3, 1550.0, 100.0, 0.06), 0.0),
            (state(4, 1700.0, 300.0, 0.06), 0.0),
        ];
        let next = Glicko2::default()
            .update(&glickman_player(), &results)
            .unwrap();
        assert!((next.rating - 1464.06).abs() < 0.05, "{next:?}");
        assert!((next.rating_deviation - 151.52).abs() < 0.05, "{next:?}");
        assert!((next.volatility - 0.05999).abs() < 1e-5, "{next:?}");
        assert_eq!(next.player_id, PlayerId::from(1));
    }

    #[test]
    fn test_win_against_weaker_opponent() {
        let player = glickman_player();
        let next = Glicko2::default()
            .update(&player, &[(state(2, 1400.0, 30.0, 0.06), 1.0)])
            .unwrap();
        assert!(next.rating > player.rating);
        assert!(next.rating_deviation < player.rating_deviation);
    }

    #[test]
    fn test_decisive_result_moves_both_players() {
        let strong = state(1, 1600.0, 80.0, 0.06);
        let weak = state(2, 1450.0, 80.0, 0.06);
        let glicko = Glicko2::default();
        let winner = glicko.update(&strong, &[(weak, 1.0)]).unwrap();
        let loser = glicko.update(&weak, &[(strong, 0.0)]).unwrap();
        assert!(winner.rating > strong.rating);
        assert!(loser.rating < weak.rating);
    }

    #[test]
    fn test_draw_between_equals() {
        let a = state(1, 1500.0, 100.0, 0.06);
        let b = state(2, 1500.0, 100.0, 0.06);
        let next = Glicko2::default().update(&a, &[(b, 0.5)]).unwrap();
        assert!((next.rating - a.rating).abs() < 1e-9);
        assert!(next.rating_deviation < a.rating_deviation);
    }

    #[test]
    fn test_no_games_widens_deviation() {
        let player = glickman_player();
        let next = Glicko2::default().update(&player, &[]).unwrap();
        assert_eq!(next.rating, player.rating);
        assert_eq!(next.volatility, player.volatility);
        assert!(next.rating_deviation > player.rating_deviation);
        let expected = SCALE * ((200.0 / SCALE).powi(2) + 0.06f64.powi(2)).sqrt();
        assert!((next.rating_deviation - expected).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let results = [
            (state(2, 1400.0, 30.0, 0.06), 1.0),
            (state(3, 1550.0, 100.0, 0.06), 0.5),
        ];
        let glicko = Glicko2::default();
        let first = glicko.update(&glickman_player(), &results).unwrap();
        for _ in 0..10 {
            let again = glicko.update(&glickman_player(), &results).unwrap();
            assert_eq!(first.rating.to_bits(), again.rating.to_bits());
            assert_eq!(
                first.rating_deviation.to_bits(),
                again.rating_deviation.to_bits()
            );
            assert_eq!(first.volatility.to_bits(), again.volatility.to_bits());
        }
    }

    #[test]
    fn test_rejects_invalid_input() {
        let glicko = Glicko2::default();
        let bad = state(1, 1500.0, 0.0, 0.06);
        assert!(matches!(
            glicko.update(&bad, &[]),
            Err(RatingError::InvalidState(_))
        ));
        assert_eq!(
            glicko.update(&glickman_player(), &[(state(2, 1500.0, 50.0, 0.06), 2.0)]),
            Err(RatingError::InvalidScore(2.0))
        );
        let nan = state(2, f64::NAN, 50.0, 0.06);
        assert!(glicko.update(&glickman_player(), &[(nan, 1.0)]).is_err());
    }

    #[test]
    fn test_iteration_cap() {
        let glicko = Glicko2::default().with_max_iterations(1);
        let results = [(state(2, 1400.0, 30.0, 0.06), 1.0)];
        assert_eq!(
            glicko.update(&glickman_player(), &results),
            Err(RatingError::NoConvergence(1))
        );
    }

    #[test]
    fn test_matches_reference_implementation() {
        use glicko2::{GameResult, Glicko2Rating, GlickoRating};

        let to_glicko2 = |s: &PlayerRatingState| Glicko2Rating {
            value: (s.rating - DEFAULT_RATING) / SCALE,
            deviation: s.rating_deviation / SCALE,
            volatility: s.volatility,
        };

        let player = state(1, 1620.0, 120.0, 0.07);
        let opponents = [
            (state(2, 1710.0, 60.0, 0.06), 0.5),
            (state(3, 1480.0, 250.0, 0.06), 1.0),
            (state(4, 1900.0, 45.0, 0.06), 0.0),
        ];
        let ours = Glicko2::default().update(&player, &opponents).unwrap();

        let games = opponents
            .iter()
            .map(|(opponent, score)| {
                let opponent = to_glicko2(opponent);
                if *score == 1.0 {
                    GameResult::win(opponent)
                } else if *score == 0.0 {
                    GameResult::loss(opponent)
                } else {
                    GameResult::draw(opponent)
                }
            })
            .collect::<Vec<_>>();
        let theirs = glicko2::new_rating(to_glicko2(&player), &games, SYSTEM_CONSTANT);
        let theirs_volatility = theirs.volatility;
        let theirs = GlickoRating::from(theirs);

        assert!((ours.rating - theirs.value).abs() < 0.05, "{ours:?}");
        assert!((ours.rating_deviation - theirs.deviation).abs() < 0.05);
        assert!((ours.volatility - theirs_volatility).abs() < 1e-5);
    }

    #[test]
    fn test_expected_score() {
        let glicko = Glicko2::default();
        let a = state(1, 1500.0, 50.0, 0.06);
        assert!((glicko.expected_score(&a, &a) - 0.5).abs() < 1e-12);
        let weaker = state(2, 1300.0, 50.0, 0.06);
        assert!(glicko.expected_score(&a, &weaker) > 0.5);
    }
}
