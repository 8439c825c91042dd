use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use warp::http::{HeaderMap, HeaderValue, StatusCode};
use warp::reply::{self, Response};
use warp::{Filter, Rejection, Reply};

use crate::auth::SessionProvider;
use crate::constants::{
    GAME_ID_HEADER, HEALTH_PATH, PLAY_PATH, START_PATH, SUBSCRIPTION_ID_HEADER,
};
use crate::core::feed::PollOutcome;
use crate::core::lobby::{Lobby, LongPollReply};
use crate::error::{LobbyError, Result};

#[derive(Debug, Default, Deserialize)]
pub struct StartQuery {
    #[serde(rename = "type")]
    pub list_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayQuery {
    #[serde(rename = "subscriptionID")]
    pub subscription_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

/// All lobby routes: `/start`, `/play` and `/health`, with request logging
pub fn routes(
    lobby: Arc<Lobby>,
    sessions: Arc<dyn SessionProvider>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let start = warp::path(START_PATH)
        .and(warp::path::end())
        .and(warp::get().or(warp::post()).unify())
        .and(warp::query::<StartQuery>())
        .and(with_session(Arc::clone(&sessions)))
        .and(with_lobby(Arc::clone(&lobby)))
        .and_then(start_handler);

    let play = warp::path(PLAY_PATH)
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<PlayQuery>())
        .and(with_session(sessions))
        .and(with_lobby(lobby))
        .and_then(play_handler);

    let health = warp::path(HEALTH_PATH).and(warp::path::end()).map(|| "OK");

    start
        .or(play)
        .or(health)
        .with(warp::log("briscola::http"))
}

// Helper filter to include the lobby in request handlers
fn with_lobby(lobby: Arc<Lobby>) -> impl Filter<Extract = (Arc<Lobby>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&lobby))
}

// Helper filter resolving the caller's session identity
fn with_session(
    sessions: Arc<dyn SessionProvider>,
) -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::header::headers_cloned()
        .map(move |headers: HeaderMap| sessions.identity_from_request(&headers))
}

/// `/start?type=<list>`: join a waiting list and long-poll
pub async fn start_handler(
    query: StartQuery,
    session: Option<String>,
    lobby: Arc<Lobby>,
) -> std::result::Result<Response, Infallible> {
    let result = lobby
        .start(session.as_deref(), query.list_name.as_deref())
        .await;
    Ok(long_poll_response(result))
}

/// `/play?subscriptionID=<id>`: long-poll the caller's personal feed
pub async fn play_handler(
    query: PlayQuery,
    session: Option<String>,
    lobby: Arc<Lobby>,
) -> std::result::Result<Response, Infallible> {
    let result = lobby
        .play(session.as_deref(), query.subscription_id.as_deref())
        .await;
    Ok(long_poll_response(result))
}

/// 200 with the event payload, or 204 when the client should poll again
pub fn long_poll_response(result: Result<LongPollReply>) -> Response {
    let reply = match result {
        Ok(reply) => reply,
        Err(err) => return error_response(err),
    };

    let mut response = match &reply.outcome {
        PollOutcome::Event(event) => {
            reply::with_status(reply::json(&event.payload), StatusCode::OK).into_response()
        }
        PollOutcome::TimedOut | PollOutcome::Closed => StatusCode::NO_CONTENT.into_response(),
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&reply.subscription_id) {
        headers.insert(SUBSCRIPTION_ID_HEADER, value);
    }
    if let Some(Ok(value)) = reply.game_id.as_deref().map(HeaderValue::from_str) {
        headers.insert(GAME_ID_HEADER, value);
    }

    response
}

pub fn error_response(err: LobbyError) -> Response {
    let status = if err.is_client_error() {
        log::debug!("Rejected request: {}", err);
        StatusCode::BAD_REQUEST
    } else {
        log::error!("Request failed: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    };

    let body = ErrorBody {
        error: err.code(),
        message: err.to_string(),
    };
    reply::with_status(reply::json(&body), status).into_response()
}
