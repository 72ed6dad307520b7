use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// The two independent balances every user holds.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    ToSchema,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum WalletType {
    #[default]
    #[sea_orm(string_value = "site_credit")]
    SiteCredit,
    #[sea_orm(string_value = "cash")]
    Cash,
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletType::SiteCredit => write!(f, "site_credit"),
            WalletType::Cash => write!(f, "cash"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "site_credit")]
    SiteCredit,
    #[sea_orm(string_value = "cash")]
    Cash,
    #[sea_orm(string_value = "card")]
    Card,
}

impl PaymentMethod {
    /// Wallet debited at checkout; `None` for card orders collected by the gateway.
    pub fn wallet(&self) -> Option<WalletType> {
        match self {
            PaymentMethod::SiteCredit => Some(WalletType::SiteCredit),
            PaymentMethod::Cash => Some(WalletType::Cash),
            PaymentMethod::Card => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::SiteCredit => write!(f, "site_credit"),
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Card => write!(f, "card"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "site_credit" => Ok(PaymentMethod::SiteCredit),
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            other => Err(other.to_string()),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl PaymentStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// Direction of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, DeriveActiveEnum, EnumIter)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum LedgerEntryKind {
    #[sea_orm(string_value = "credit")]
    Credit,
    #[sea_orm(string_value = "debit")]
    Debit,
    #[sea_orm(string_value = "reversal")]
    Reversal,
}

/// What a ledger row is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, DeriveActiveEnum, EnumIter)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum LedgerReasonKind {
    #[sea_orm(string_value = "ticket")]
    Ticket,
    #[sea_orm(string_value = "order")]
    Order,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!(
            "site_credit".parse::<PaymentMethod>(),
            Ok(PaymentMethod::SiteCredit)
        );
        assert_eq!(" CARD ".parse::<PaymentMethod>(), Ok(PaymentMethod::Card));
        assert_eq!(
            "paypal".parse::<PaymentMethod>(),
            Err("paypal".to_string())
        );
    }

    #[test]
    fn test_payment_method_wallet() {
        assert_eq!(PaymentMethod::Cash.wallet(), Some(WalletType::Cash));
        assert_eq!(PaymentMethod::Card.wallet(), None);
    }

    #[test]
    fn test_wallet_type_serde_names() {
        assert_eq!(
            serde_json::to_string(&WalletType::SiteCredit).unwrap(),
            "\"site_credit\""
        );
        let w: WalletType = serde_json::from_str("\"cash\"").unwrap();
        assert_eq!(w, WalletType::Cash);
    }
}
