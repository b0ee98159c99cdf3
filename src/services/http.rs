use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tower_http::trace::TraceLayer;

use super::{ledger::LedgerRequest, users::UserRequest, ServiceChannels, ServiceError};

mod transfers;
mod users;

#[derive(Clone)]
struct AppState {
    user_channel: mpsc::Sender<UserRequest>,
    ledger_channel: mpsc::Sender<LedgerRequest>,
}

type ApiResponse = (StatusCode, Json<Value>);

/// Sends a request built around a fresh oneshot and waits for its reply.
async fn request<T, R>(
    channel: &mpsc::Sender<T>,
    build: impl FnOnce(oneshot::Sender<Result<R, ServiceError>>) -> T,
) -> Result<R, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(build(response_tx))
        .await
        .map_err(|e| ServiceError::Communication("HTTP => Service".to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication("Service => HTTP".to_string(), e.to_string()))?
}

fn error_response(err: ServiceError) -> ApiResponse {
    let (status, message) = match &err {
        ServiceError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
        ServiceError::InsufficientFunds { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "insufficient funds".to_string(),
        ),
        ServiceError::Validation(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
        ServiceError::Conflict(reason) => (StatusCode::CONFLICT, reason.clone()),
        ServiceError::Persistence(_)
        | ServiceError::Communication(_, _)
        | ServiceError::Internal(_) => {
            log::error!("Request failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "could not complete request".to_string(),
            )
        }
    };

    (status, Json(json!({ "error": message })))
}

fn bad_request(message: &str) -> ApiResponse {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

/// Any body axum cannot turn into the request type, whether the JSON itself is
/// broken or a field has the wrong type.
fn malformed_body(rejection: JsonRejection) -> ApiResponse {
    log::debug!("Rejected request body: {}", rejection.body_text());
    bad_request("failed to parse request")
}

async fn health() -> ApiResponse {
    (StatusCode::OK, Json(json!({ "status": "alive" })))
}

pub fn router(channels: ServiceChannels) -> Router {
    let app_state = AppState {
        user_channel: channels.user_channel,
        ledger_channel: channels.ledger_channel,
    };

    Router::new()
        .route("/healthz", get(health))
        .route("/register", post(users::register))
        .route("/transaction", post(transfers::create_transfer))
        .route("/users/{id}", get(users::get_user_details))
        .route("/users/{id}/wallet", get(transfers::get_wallet))
        .route("/users/{id}/payouts", get(users::get_payouts))
        .route("/referrals/{code}", get(users::get_referrals))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(
    listen: &str,
    channels: ServiceChannels,
) -> Result<(), anyhow::Error> {
    let app = router(channels);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
