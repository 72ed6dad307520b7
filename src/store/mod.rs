//! Storage seams of the settlement engine.
//!
//! Every cross-request mutation goes through one of these traits and every
//! implementation must make each method a single atomic step: a claim is an
//! insert-if-absent, a balance change is a conditional increment committed
//! together with its ledger row, the order number is a counter increment.
//! `postgres` backs the running service, `memory` backs tests and local runs.

pub mod memory;
pub mod postgres;

use crate::entities::WalletType;
use crate::error::AppResult;
use crate::models::{
    Cart, Competition, CompetitionTickets, Coupon, LedgerOutcome, LedgerReason, Order,
    PaginationParams, Ticket, WalletBalances,
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyTaken,
}

/// Per competition claim table; the sole authority on ticket number ownership.
#[async_trait]
pub trait TicketPool: Send + Sync {
    /// Takes `ticket.ticket_number` for `ticket.competition_id` if nobody holds it.
    async fn claim(&self, ticket: &Ticket) -> AppResult<ClaimOutcome>;

    /// Drops a tentative claim owned by `order_id`. Only used by compensation.
    async fn release(&self, competition_id: Uuid, ticket_number: i64, order_id: Uuid)
    -> AppResult<()>;

    async fn count_live(&self, competition_id: Uuid) -> AppResult<u64>;

    async fn tickets_for_order(&self, order_id: Uuid) -> AppResult<Vec<Ticket>>;
}

/// Sole authority over wallet balances. Every mutation is attributed to a reason and
/// replaying a reason is a no-op.
#[async_trait]
pub trait WalletLedger: Send + Sync {
    async fn credit(
        &self,
        user_id: Uuid,
        wallet: WalletType,
        amount: i64,
        reason: LedgerReason,
    ) -> AppResult<LedgerOutcome>;

    /// Fails with `AppError::InsufficientFunds` when the balance at the moment of
    /// mutation is below `amount`.
    async fn debit(
        &self,
        user_id: Uuid,
        wallet: WalletType,
        amount: i64,
        reason: LedgerReason,
    ) -> AppResult<LedgerOutcome>;

    /// Undoes the credit or debit recorded for `reason`, at most once.
    async fn reverse(&self, reason: LedgerReason) -> AppResult<LedgerOutcome>;

    async fn balances(&self, user_id: Uuid) -> AppResult<Option<WalletBalances>>;
}

#[async_trait]
pub trait OrderSequencer: Send + Sync {
    async fn next(&self) -> AppResult<i64>;
}

/// Read side of competitions and coupons plus their two counters.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn competition(&self, id: Uuid) -> AppResult<Option<Competition>>;

    /// Atomically adds `quantity` to the competition's sold counter.
    async fn record_sale(&self, competition_id: Uuid, quantity: i64) -> AppResult<()>;

    async fn coupon(&self, code: &str) -> AppResult<Option<Coupon>>;

    /// Counts one use of the coupon if it is still redeemable. Returns whether it did.
    async fn redeem_coupon(&self, code: &str) -> AppResult<bool>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> AppResult<()>;

    async fn find(&self, id: Uuid) -> AppResult<Option<Order>>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        params: &PaginationParams,
    ) -> AppResult<(Vec<Order>, u64)>;

    async fn attach_payment_job(&self, id: Uuid, job_reference: &str) -> AppResult<()>;

    /// Marks a `pending` order as being settled. Only one caller ever gets `true`.
    async fn begin_settlement(&self, id: Uuid) -> AppResult<bool>;

    /// `pending` → `completed` with the ticket summary. `false` if the order had already left `pending`.
    async fn complete(&self, id: Uuid, tickets: &[CompetitionTickets]) -> AppResult<bool>;

    /// External failure: `pending` → `failed`, only while no settlement has started.
    /// `false` if the order had left `pending` or a settlement owns it.
    async fn fail(&self, id: Uuid) -> AppResult<bool>;

    /// `pending` → `failed` for the caller that won `begin_settlement`.
    async fn fail_settlement(&self, id: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn cart(&self, user_id: Uuid) -> AppResult<Option<Cart>>;

    async fn clear(&self, user_id: Uuid) -> AppResult<()>;
}

/// The full set of stores the services are wired with.
#[derive(Clone)]
pub struct Stores {
    pub tickets: Arc<dyn TicketPool>,
    pub ledger: Arc<dyn WalletLedger>,
    pub sequencer: Arc<dyn OrderSequencer>,
    pub catalog: Arc<dyn Catalog>,
    pub orders: Arc<dyn OrderRepository>,
    pub carts: Arc<dyn CartRepository>,
}

impl Stores {
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            tickets: store.clone(),
            ledger: store.clone(),
            sequencer: store.clone(),
            catalog: store.clone(),
            orders: store.clone(),
            carts: store,
        }
    }
}
