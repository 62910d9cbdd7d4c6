//! The HTTP boundary.

use gambit_core::{
    game::MatchId,
    message::{CompleteMatch, ErrorReport},
    player::PlayerId,
    tournament::TournamentId,
    Error,
};
use gambit_service::{Notifier, Orchestrator, PlayerDirectory, TournamentDirectory};
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    Body, Request, Response, StatusCode,
};
use serde::Serialize;
use std::{convert::Infallible, str::FromStr, sync::Arc};

/// Header carrying the identity of the caller, as established by the gateway.
pub const CALLER_HEADER: &str = "x-caller-id";

#[derive(Debug, thiserror::Error)]
pub enum Failure {
    #[error(transparent)]
    Domain(#[from] Error),
    #[error("{0}")]
    BadRequest(String),
    #[error("missing or malformed x-caller-id header")]
    NoCaller,
    #[error("no such endpoint")]
    NoRoute,
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl Failure {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Domain(err) => match err {
                Error::NotFound(_) => StatusCode::NOT_FOUND,
                Error::InvalidState(_) => StatusCode::CONFLICT,
                Error::Ineligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Error::Unauthorized { .. } => StatusCode::FORBIDDEN,
                Error::Downstream(_) => StatusCode::BAD_GATEWAY,
                Error::Computation { .. } | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NoCaller => StatusCode::UNAUTHORIZED,
            Self::NoRoute => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn report(&self) -> ErrorReport {
        match self {
            Self::Domain(err) => ErrorReport::from(err),
            Self::BadRequest(_) => self.named("bad_request"),
            Self::NoCaller => self.named("unauthenticated"),
            Self::NoRoute => self.named("not_found"),
            Self::Internal(_) => self.named("internal"),
        }
    }

    fn named(&self, error: &str) -> ErrorReport {
        ErrorReport {
            error: error.into(),
            reason: self.to_string(),
        }
    }

    fn into_response(self) -> Response<Body> {
        let status = self.status_code();
        let body = serde_json::to_vec(&self.report()).unwrap_or_default();
        response(status, body)
    }
}

/// An endpoint of the service, with its path parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Matchmaking(TournamentId),
    CompleteMatch(MatchId),
    NextRound(TournamentId),
    Finalize(TournamentId),
    Withdraw(TournamentId, PlayerId),
    Matches(TournamentId, Option<u32>),
    Results(TournamentId),
    Standings(TournamentId),
}

impl Route {
    pub fn parse(method: &str, path: &str, query: Option<&str>) -> Result<Self, Failure> {
        let segments = path.trim_matches('/').split('/').collect::<Vec<_>>();
        Ok(match (method, segments.as_slice()) {
            ("POST", ["tournaments", id, "matchmaking"]) => Self::Matchmaking(param(id)?),
            ("POST", ["matches", id, "complete"]) => Self::CompleteMatch(param(id)?),
            ("POST", ["tournaments", id, "rounds", "next"]) => Self::NextRound(param(id)?),
            ("POST", ["tournaments", id, "finalize"]) => Self::Finalize(param(id)?),
            ("POST", ["tournaments", id, "players", player, "withdraw"]) => {
                Self::Withdraw(param(id)?, param(player)?)
            }
            ("GET", ["tournaments", id, "matches"]) => {
                let round = query
                    .into_iter()
                    .flat_map(|query| query.split('&'))
                    .find_map(|pair| pair.strip_prefix("round="))
                    .map(param)
                    .transpose()?;
                Self::Matches(param(id)?, round)
            }
            ("GET", ["tournaments", id, "results"]) => Self::Results(param(id)?),
            ("GET", ["tournaments", id, "standings"]) => Self::Standings(param(id)?),
            _ => return Err(Failure::NoRoute),
        })
    }
}

fn param<T: FromStr>(segment: &str) -> Result<T, Failure> {
    segment
        .parse()
        .map_err(|_| Failure::BadRequest(format!("invalid path parameter {segment}")))
}

/// Serve one request.
pub async fn handle<P, T, N>(
    orchestrator: Arc<Orchestrator<P, T, N>>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible>
where
    P: PlayerDirectory + Sync,
    T: TournamentDirectory + Sync,
    N: Notifier + Sync,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = match respond(&orchestrator, req).await {
        Ok(response) => response,
        Err(failure) => {
            let status = failure.status_code();
            if status.is_server_error() {
                tracing::error!(%method, %path, %status, "{failure}");
            } else {
                tracing::info!(%method, %path, %status, "{failure}");
            }
            failure.into_response()
        }
    };
    tracing::debug!(%method, %path, status = %response.status(), "handled request");
    Ok(response)
}

async fn respond<P, T, N>(
    orchestrator: &Orchestrator<P, T, N>,
    req: Request<Body>,
) -> Result<Response<Body>, Failure>
where
    P: PlayerDirectory + Sync,
    T: TournamentDirectory + Sync,
    N: Notifier + Sync,
{
    let route = Route::parse(req.method().as_str(), req.uri().path(), req.uri().query())?;
    match route {
        Route::Matchmaking(id) => {
            let matches = orchestrator.run_matchmaking(caller(&req)?, id).await?;
            json(StatusCode::CREATED, &matches)
        }
        Route::CompleteMatch(id) => {
            let caller = caller(&req)?;
            let body = hyper::body::to_bytes(req.into_body())
                .await
                .map_err(|err| Failure::BadRequest(format!("unreadable body: {err}")))?;
            let claim: CompleteMatch = serde_json::from_slice(&body)
                .map_err(|err| Failure::BadRequest(format!("malformed result: {err}")))?;
            json(
                StatusCode::OK,
                &orchestrator.complete_match(caller, id, &claim).await?,
            )
        }
        Route::NextRound(id) => json(
            StatusCode::OK,
            &orchestrator.prepare_next_round(caller(&req)?, id).await?,
        ),
        Route::Finalize(id) => json(
            StatusCode::OK,
            &orchestrator.finalize_tournament(caller(&req)?, id).await?,
        ),
        Route::Withdraw(id, player) => json(
            StatusCode::OK,
            &orchestrator.withdraw(caller(&req)?, id, player).await?,
        ),
        Route::Matches(id, round) => json(StatusCode::OK, &orchestrator.matches(id, round).await?),
        Route::Results(id) => json(StatusCode::OK, &orchestrator.match_results(id).await?),
        Route::Standings(id) => json(StatusCode::OK, &orchestrator.standings(id).await?),
    }
}

fn caller(req: &Request<Body>) -> Result<PlayerId, Failure> {
    req.headers()
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .ok_or(Failure::NoCaller)
}

fn json(status: StatusCode, body: &impl Serialize) -> Result<Response<Body>, Failure> {
    let body = serde_json::to_vec(body).map_err(|err| Failure::Internal(err.into()))?;
    Ok(response(status, body))
}

fn response(status: StatusCode, body: Vec<u8>) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
