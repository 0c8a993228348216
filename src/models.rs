use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "approved")]
    Approved,
    #[serde(alias = "rejected")]
    Rejected,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 3] = [Self::Pending, Self::Approved, Self::Rejected];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletStatus {
    #[serde(alias = "active")]
    Active,
    #[serde(alias = "inactive")]
    Inactive,
    #[serde(alias = "frozen")]
    Frozen,
}

impl WalletStatus {
    pub const ALL: [WalletStatus; 3] = [Self::Active, Self::Inactive, Self::Frozen];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Frozen => "FROZEN",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

pub const USER_ROLES: &[&str] = &["SUPER_ADMIN", "ADMIN", "MANAGER", "USER"];
pub const USER_STATUSES: &[&str] = &["ACTIVE", "PENDING", "SUSPENDED", "INACTIVE"];
pub const ACTIVITY_MODULES: &[&str] = &[
    "AUTH",
    "USER",
    "KYC",
    "PORTFOLIO",
    "WALLET",
    "DEPOSIT",
    "WITHDRAWAL",
    "REPORT",
    "ACTIVITY",
    "SYSTEM",
];
pub const ACTIVITY_STATUSES: &[&str] = &["SUCCESS", "FAILED", "WARNING"];

/// Deposits and withdrawals share one row shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub wallet_id: Option<String>,
    #[serde(deserialize_with = "number_or_string")]
    pub amount: f64,
    pub status: TransactionStatus,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn is_approved(&self) -> bool {
        self.status == TransactionStatus::Approved
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Wallet {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(deserialize_with = "number_or_string")]
    pub balance: f64,
    #[serde(default, deserialize_with = "number_or_string")]
    pub nav: f64,
    #[serde(default, deserialize_with = "number_or_string")]
    pub fees: f64,
    #[serde(default)]
    pub currency: Option<String>,
    pub status: WalletStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct PortfolioAsset {
    pub id: String,
    pub portfolio_id: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(deserialize_with = "number_or_string")]
    pub quantity: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub cost_price: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub close_value: f64,
}

impl PortfolioAsset {
    /// Derived from the current quantity, cost and close value on every call.
    pub fn gain_loss(&self) -> f64 {
        (self.close_value - self.cost_price) * self.quantity
    }

    pub fn cost_basis(&self) -> f64 {
        self.cost_price * self.quantity
    }

    pub fn market_value(&self) -> f64 {
        self.close_value * self.quantity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Portfolio {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub assets: Vec<PortfolioAsset>,
}

impl Portfolio {
    pub fn market_value(&self) -> f64 {
        self.assets.iter().map(PortfolioAsset::market_value).sum()
    }

    pub fn cost_basis(&self) -> f64 {
        self.assets.iter().map(PortfolioAsset::cost_basis).sum()
    }

    pub fn gain_loss(&self) -> f64 {
        self.assets.iter().map(PortfolioAsset::gain_loss).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub kyc_status: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ActivityLog {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub action: String,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    pub fn is_success(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("SUCCESS"))
    }

    pub fn is_failure(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("FAILED"))
    }
}

/// Audit entry written by this service.
#[derive(Debug, Clone, Serialize)]
pub struct NewActivityLog {
    pub user_id: Option<String>,
    pub action: String,
    pub module: String,
    pub status: String,
    pub description: String,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => Ok(number.as_f64().unwrap_or(0.0)),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid numeric value '{text}'"))),
        Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, got {other}"
        ))),
    }
}
