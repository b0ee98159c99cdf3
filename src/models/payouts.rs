use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of qualifying entities that make up one rewarded batch.
pub const MIN_REFERRALS: usize = 3;

/// Bonus credited to a referrer per completed batch.
pub const REFERRAL_BONUS: i64 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Signups,
    Transactions,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Signups => "signups",
            ActivityType::Transactions => "transactions",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signups" => Ok(ActivityType::Signups),
            "transactions" => Ok(ActivityType::Transactions),
            other => Err(format!("unknown activity type: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Paid,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Paid => "paid",
        }
    }
}

impl FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PayoutStatus::Pending),
            "paid" => Ok(PayoutStatus::Paid),
            other => Err(format!("unknown payout status: {other}")),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Payout {
    pub id: i64,
    pub user_id: i64,
    pub activity_type: ActivityType,
    pub checkpoint_id: i64,
    pub amount: Decimal,
    pub status: PayoutStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug)]
pub struct NewPayout {
    pub user_id: i64,
    pub activity_type: ActivityType,
    pub checkpoint_id: i64,
    pub amount: Decimal,
}

/// Outcome of a checkpoint evaluation. `payout` is only set when a batch was
/// completed and recorded.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub payout: Option<Payout>,
    pub triggered: bool,
}

impl Evaluation {
    pub fn skipped() -> Self {
        Evaluation {
            payout: None,
            triggered: false,
        }
    }

    pub fn triggered(payout: Payout) -> Self {
        Evaluation {
            payout: Some(payout),
            triggered: true,
        }
    }
}
