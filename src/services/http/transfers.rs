use std::str::FromStr;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use super::{bad_request, error_response, malformed_body, request, ApiResponse, AppState};
use crate::{models::transfers::TransferRequest, services::ledger::LedgerRequest};

/// Accepts `"42"` or `42`.
fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Accepts `"12.50"` or `12.5`. Numbers go through their decimal text so no
/// binary float rounding leaks into the amount.
fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    }
}

pub async fn create_transfer(
    State(state): State<AppState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResponse {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_body(rejection),
    };
    let Some(sender_id) = parse_id(&payload.sender_id) else {
        return bad_request("sender_id must be a valid user id");
    };
    let Some(recipient_id) = parse_id(&payload.recipient_id) else {
        return bad_request("recipient_id must be a valid user id");
    };
    let Some(amount) = parse_amount(&payload.amount) else {
        return bad_request("amount must be a decimal number");
    };

    let result = request(&state.ledger_channel, |response| LedgerRequest::Transfer {
        sender_id,
        recipient_id,
        amount,
        description: payload.description,
        response,
    })
    .await;

    match result {
        Ok(transfer) => (StatusCode::CREATED, Json(json!(transfer))),
        Err(e) => error_response(e),
    }
}

pub async fn get_wallet(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResponse {
    match request(&state.ledger_channel, |response| LedgerRequest::GetWallet {
        user_id: id,
        response,
    })
    .await
    {
        Ok(wallet) => (StatusCode::OK, Json(json!(wallet))),
        Err(e) => error_response(e),
    }
}
