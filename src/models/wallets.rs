use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Debit => "debit",
            Direction::Credit => "credit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(Direction::Debit),
            "credit" => Ok(Direction::Credit),
            other => Err(format!("unknown wallet entry direction: {other}")),
        }
    }
}

/// One immutable movement on a user's account. The closing balance of the
/// newest entry is the user's balance.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WalletEntry {
    pub id: i64,
    pub user_id: i64,
    pub direction: Direction,
    pub transfer_reference: String,
    pub amount: Decimal,
    pub closing_balance: Decimal,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Wallet {
    pub user_id: i64,
    pub balance: Decimal,
    pub entries: Vec<WalletEntry>,
}
