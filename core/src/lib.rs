//! Core of the tournament service: the rating engine, round pairing, and the match lifecycle.

pub mod db;
pub mod error;
pub mod game;
pub mod lifecycle;
pub mod message;
pub mod pairing;
pub mod player;
pub mod rating;
pub mod standings;
pub mod tournament;

pub use error::{Error, NotFound, Result};
