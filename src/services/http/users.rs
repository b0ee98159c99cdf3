use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use super::{error_response, malformed_body, request, ApiResponse, AppState};
use crate::{models::users::RegisterRequest, services::users::UserRequest};

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResponse {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_body(rejection),
    };

    let result = request(&state.user_channel, |response| UserRequest::CreateUser {
        username: payload.username,
        password: payload.password,
        referrer_code: payload.referrer,
        response,
    })
    .await;

    match result {
        Ok(user) => (StatusCode::CREATED, Json(json!(user))),
        Err(e) => error_response(e),
    }
}

pub async fn get_user_details(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResponse {
    match request(&state.user_channel, |response| UserRequest::GetUserDetails {
        id,
        response,
    })
    .await
    {
        Ok(details) => (StatusCode::OK, Json(json!(details))),
        Err(e) => error_response(e),
    }
}

pub async fn get_payouts(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResponse {
    match request(&state.user_channel, |response| UserRequest::GetPayouts {
        id,
        response,
    })
    .await
    {
        Ok(payouts) => (StatusCode::OK, Json(json!(payouts))),
        Err(e) => error_response(e),
    }
}

pub async fn get_referrals(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResponse {
    let result = request(&state.user_channel, |response| UserRequest::GetReferrals {
        referral_code: code,
        response,
    })
    .await;

    match result {
        Ok((user, referred)) => (
            StatusCode::OK,
            Json(json!({
                "user": user,
                "referred": referred,
            })),
        ),
        Err(e) => error_response(e),
    }
}
