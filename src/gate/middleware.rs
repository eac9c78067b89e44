//! axum middleware enforcing gate verdicts.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::{Gate, Verdict};
use crate::store::CounterStore;

/// Body returned with `429 Too Many Requests`.
pub const LIMITED_MESSAGE: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// Body returned with `500 Internal Server Error` when no decision could be made.
pub const STORE_FAILURE_MESSAGE: &str = "Internal error";

/// Gate every request through the rate limiter.
///
/// Install with `axum::middleware::from_fn_with_state(gate, enforce)`. The
/// peer address is taken from `ConnectInfo<SocketAddr>` when the router is
/// served with connect info; otherwise only headers are used.
pub async fn enforce<S>(State(gate): State<Arc<Gate<S>>>, req: Request, next: Next) -> Response
where
    S: CounterStore + 'static,
{
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());

    match gate.evaluate(req.headers(), peer).await {
        Verdict::Allow => next.run(req).await,
        Verdict::Limited => (StatusCode::TOO_MANY_REQUESTS, LIMITED_MESSAGE).into_response(),
        Verdict::Failed => {
            (StatusCode::INTERNAL_SERVER_ERROR, STORE_FAILURE_MESSAGE).into_response()
        }
    }
}
