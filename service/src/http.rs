//! HTTP clients for the collaborator services.

use crate::{Notifier, PlayerDirectory, TournamentDirectory};
use anyhow::{ensure, Context};
use gambit_core::{
    game::MatchId,
    message::Notice,
    player::{PlayerId, PlayerProfile},
    rating::PlayerRatingState,
    standings::Standing,
    tournament::{TournamentId, TournamentInfo},
};
use hyper::{client::connect::HttpConnector, Body, Client, Method, Request};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// A JSON client for one collaborator, rooted at its base URL.
#[derive(Clone, Debug)]
struct JsonClient {
    client: Client<HttpConnector>,
    base: Url,
    timeout: Duration,
}

impl JsonClient {
    fn new(mut base: Url, timeout: Duration) -> Self {
        // Paths are joined onto the base, which only keeps its last segment with a trailing slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self {
            client: Client::new(),
            base,
            timeout,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let body = self.send(Method::GET, path, Body::empty()).await?;
        serde_json::from_slice(&body).with_context(|| format!("malformed response from {path}"))
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> anyhow::Result<()> {
        let body = Body::from(serde_json::to_string(body)?);
        self.send(Method::POST, path, body).await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Body,
    ) -> anyhow::Result<hyper::body::Bytes> {
        let url = self.base.join(path)?;
        let request = Request::builder()
            .method(method)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .uri(url.as_str())
            .body(body)?;

        let exchange = async {
            let response = self.client.request(request).await?;
            ensure!(
                response.status().is_success(),
                "{url}: request failed: {}",
                response.status()
            );
            Ok::<_, anyhow::Error>(hyper::body::to_bytes(response).await?)
        };
        timeout(self.timeout, exchange)
            .await
            .with_context(|| format!("{url}: timed out after {:?}", self.timeout))?
    }
}

#[derive(Clone, Debug)]
pub struct HttpPlayerDirectory {
    client: JsonClient,
}

impl HttpPlayerDirectory {
    pub fn new(base: Url, timeout: Duration) -> Self {
        Self {
            client: JsonClient::new(base, timeout),
        }
    }
}

impl PlayerDirectory for HttpPlayerDirectory {
    async fn fetch_player(&self, id: PlayerId) -> anyhow::Result<PlayerProfile> {
        self.client
            .get(&format!("api/v1/player/{id}/details"))
            .await
            .with_context(|| format!("fetching player {id}"))
    }

    async fn push_rating(&self, rating: &PlayerRatingState) -> anyhow::Result<()> {
        self.client
            .post("api/v1/profile/rating", rating)
            .await
            .with_context(|| format!("pushing rating of player {}", rating.player_id))
    }
}

#[derive(Clone, Debug)]
pub struct HttpTournamentDirectory {
    client: JsonClient,
}

impl HttpTournamentDirectory {
    pub fn new(base: Url, timeout: Duration) -> Self {
        Self {
            client: JsonClient::new(base, timeout),
        }
    }
}

impl TournamentDirectory for HttpTournamentDirectory {
    async fn fetch_tournament(&self, id: TournamentId) -> anyhow::Result<TournamentInfo> {
        self.client
            .get(&format!("api/v1/tournaments/public/{id}"))
            .await
            .with_context(|| format!("fetching tournament {id}"))
    }

    async fn notify_round_advance(
        &self,
        id: TournamentId,
        round: u32,
        matches: &[MatchId],
    ) -> anyhow::Result<()> {
        let notice = Notice::RoundAdvanced {
            tournament_id: id,
            round,
            matches: matches.to_vec(),
        };
        self.client
            .post(&format!("api/v1/tournaments/{id}/events"), &notice)
            .await
    }

    async fn notify_finalized(
        &self,
        id: TournamentId,
        standings: &[Standing],
    ) -> anyhow::Result<()> {
        let notice = Notice::TournamentFinalized {
            tournament_id: id,
            standings: standings.to_vec(),
        };
        self.client
            .post(&format!("api/v1/tournaments/{id}/events"), &notice)
            .await
    }
}

#[derive(Clone, Debug)]
pub struct HttpNotifier {
    client: JsonClient,
}

impl HttpNotifier {
    pub fn new(base: Url, timeout: Duration) -> Self {
        Self {
            client: JsonClient::new(base, timeout),
        }
    }
}

impl Notifier for HttpNotifier {
    async fn send_match_notification(&self, notice: &Notice) -> anyhow::Result<()> {
        self.client.post("api/v1/email/match", notice).await
    }
}
