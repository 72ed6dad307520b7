use crate::entities::{LedgerReasonKind, WalletType, user_entity};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct WalletBalances {
    pub site_credit_balance: i64,
    pub cash_balance: i64,
}

impl WalletBalances {
    pub fn get(&self, wallet: WalletType) -> i64 {
        match wallet {
            WalletType::SiteCredit => self.site_credit_balance,
            WalletType::Cash => self.cash_balance,
        }
    }

    pub fn get_mut(&mut self, wallet: WalletType) -> &mut i64 {
        match wallet {
            WalletType::SiteCredit => &mut self.site_credit_balance,
            WalletType::Cash => &mut self.cash_balance,
        }
    }
}

impl From<user_entity::Model> for WalletBalances {
    fn from(m: user_entity::Model) -> Self {
        Self {
            site_credit_balance: m.site_credit_balance,
            cash_balance: m.cash_balance,
        }
    }
}

/// What a balance mutation is attributed to: a ticket's instant win or an order's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerReason {
    Ticket(Uuid),
    Order(Uuid),
}

impl LedgerReason {
    pub fn kind(&self) -> LedgerReasonKind {
        match self {
            LedgerReason::Ticket(_) => LedgerReasonKind::Ticket,
            LedgerReason::Order(_) => LedgerReasonKind::Order,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            LedgerReason::Ticket(id) | LedgerReason::Order(id) => *id,
        }
    }
}

impl std::fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerReason::Ticket(id) => write!(f, "ticket:{id}"),
            LedgerReason::Order(id) => write!(f, "order:{id}"),
        }
    }
}

/// Result of a ledger mutation. Replaying a reason that was already applied is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    Applied,
    Duplicate,
    /// `reverse` found nothing to undo.
    NothingToReverse,
}
