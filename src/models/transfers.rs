use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Transfer {
    pub id: i64,
    pub reference: String,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub amount: Decimal,
    pub description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug)]
pub struct NewTransfer {
    pub reference: String,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub amount: Decimal,
    pub description: String,
}

/// Wire format of `POST /transaction`. Ids arrive as strings and the amount as
/// a decimal string or a plain JSON number.
#[derive(Clone, Debug, Deserialize)]
pub struct TransferRequest {
    #[serde(default)]
    pub sender_id: serde_json::Value,
    #[serde(default)]
    pub recipient_id: serde_json::Value,
    #[serde(default)]
    pub amount: serde_json::Value,
    #[serde(default)]
    pub description: String,
}
