//! In-process implementation of every store trait.
//!
//! Each method takes one mutex for its whole read-modify-write, which gives the
//! same single-step atomicity the Postgres implementation gets from conditional
//! statements. Locks are never held across an `.await`.

use super::{
    CartRepository, Catalog, ClaimOutcome, OrderRepository, OrderSequencer, TicketPool,
    WalletLedger,
};
use crate::entities::{LedgerEntryKind, LedgerReasonKind, PaymentStatus, WalletType};
use crate::error::{AppError, AppResult};
use crate::models::{
    Cart, Competition, CompetitionTickets, Coupon, LedgerOutcome, LedgerReason, Order,
    PaginationParams, Ticket, WalletBalances,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
struct LedgerRow {
    user_id: Uuid,
    wallet: WalletType,
    amount: i64,
}

type LedgerKey = (LedgerReasonKind, Uuid, LedgerEntryKind);

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Uuid, WalletBalances>,
    entries: HashMap<LedgerKey, LedgerRow>,
}

impl LedgerState {
    fn key(reason: LedgerReason, kind: LedgerEntryKind) -> LedgerKey {
        (reason.kind(), reason.id(), kind)
    }
}

struct StoredOrder {
    order: Order,
    settling: bool,
}

pub struct MemoryStore {
    tickets: Mutex<HashMap<(Uuid, i64), Ticket>>,
    ledger: Mutex<LedgerState>,
    next_order_number: AtomicI64,
    competitions: Mutex<HashMap<Uuid, Competition>>,
    coupons: Mutex<HashMap<String, Coupon>>,
    orders: Mutex<HashMap<Uuid, StoredOrder>>,
    carts: Mutex<HashMap<Uuid, Cart>>,
}

impl MemoryStore {
    pub fn new(order_number_start: i64) -> Self {
        Self {
            tickets: Mutex::new(HashMap::new()),
            ledger: Mutex::new(LedgerState::default()),
            next_order_number: AtomicI64::new(order_number_start),
            competitions: Mutex::new(HashMap::new()),
            coupons: Mutex::new(HashMap::new()),
            orders: Mutex::new(HashMap::new()),
            carts: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_user(&self, user_id: Uuid, balances: WalletBalances) {
        lock(&self.ledger).balances.insert(user_id, balances);
    }

    pub fn add_competition(&self, competition: Competition) {
        lock(&self.competitions).insert(competition.id, competition);
    }

    pub fn add_coupon(&self, coupon: Coupon) {
        lock(&self.coupons).insert(coupon.code.trim().to_uppercase(), coupon);
    }

    pub fn set_cart(&self, cart: Cart) {
        lock(&self.carts).insert(cart.user_id, cart);
    }

    /// Inserts a ticket directly, as if sold by an earlier order.
    pub fn seed_ticket(&self, ticket: Ticket) {
        lock(&self.tickets).insert((ticket.competition_id, ticket.ticket_number), ticket);
    }

    pub fn competition_tickets(&self, competition_id: Uuid) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = lock(&self.tickets)
            .values()
            .filter(|t| t.competition_id == competition_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.ticket_number);
        tickets
    }

    pub fn ledger_entry_count(&self) -> usize {
        lock(&self.ledger).entries.len()
    }

    pub fn coupon_uses(&self, code: &str) -> Option<i32> {
        lock(&self.coupons)
            .get(&code.trim().to_uppercase())
            .map(|c| c.times_used)
    }

    pub fn sold(&self, competition_id: Uuid) -> Option<i64> {
        lock(&self.competitions)
            .get(&competition_id)
            .map(|c| c.tickets_sold)
    }
}

impl MemoryStore {
    fn fail_pending(&self, id: Uuid, settling: bool) -> AppResult<bool> {
        let mut orders = lock(&self.orders);
        match orders.get_mut(&id) {
            Some(stored)
                if stored.order.payment_status == PaymentStatus::Pending
                    && stored.settling == settling =>
            {
                stored.order.payment_status = PaymentStatus::Failed;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::NotFound("Order not found".into())),
        }
    }
}

#[async_trait]
impl TicketPool for MemoryStore {
    async fn claim(&self, ticket: &Ticket) -> AppResult<ClaimOutcome> {
        let mut tickets = lock(&self.tickets);
        let key = (ticket.competition_id, ticket.ticket_number);
        if tickets.contains_key(&key) {
            return Ok(ClaimOutcome::AlreadyTaken);
        }
        tickets.insert(key, ticket.clone());
        Ok(ClaimOutcome::Claimed)
    }

    async fn release(
        &self,
        competition_id: Uuid,
        ticket_number: i64,
        order_id: Uuid,
    ) -> AppResult<()> {
        let mut tickets = lock(&self.tickets);
        let key = (competition_id, ticket_number);
        if tickets.get(&key).is_some_and(|t| t.order_id == order_id) {
            tickets.remove(&key);
        }
        Ok(())
    }

    async fn count_live(&self, competition_id: Uuid) -> AppResult<u64> {
        Ok(lock(&self.tickets)
            .keys()
            .filter(|(cid, _)| *cid == competition_id)
            .count() as u64)
    }

    async fn tickets_for_order(&self, order_id: Uuid) -> AppResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = lock(&self.tickets)
            .values()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| (t.competition_id, t.ticket_number));
        Ok(tickets)
    }
}

#[async_trait]
impl WalletLedger for MemoryStore {
    async fn credit(
        &self,
        user_id: Uuid,
        wallet: WalletType,
        amount: i64,
        reason: LedgerReason,
    ) -> AppResult<LedgerOutcome> {
        if amount < 0 {
            return Err(AppError::ValidationError("Negative credit".into()));
        }
        let mut state = lock(&self.ledger);
        let key = LedgerState::key(reason, LedgerEntryKind::Credit);
        if state.entries.contains_key(&key) {
            return Ok(LedgerOutcome::Duplicate);
        }
        let balances = state
            .balances
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        *balances.get_mut(wallet) += amount;
        state.entries.insert(
            key,
            LedgerRow {
                user_id,
                wallet,
                amount,
            },
        );
        Ok(LedgerOutcome::Applied)
    }

    async fn debit(
        &self,
        user_id: Uuid,
        wallet: WalletType,
        amount: i64,
        reason: LedgerReason,
    ) -> AppResult<LedgerOutcome> {
        if amount < 0 {
            return Err(AppError::ValidationError("Negative debit".into()));
        }
        let mut state = lock(&self.ledger);
        let key = LedgerState::key(reason, LedgerEntryKind::Debit);
        if state.entries.contains_key(&key) {
            return Ok(LedgerOutcome::Duplicate);
        }
        let balances = state
            .balances
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        let balance = balances.get_mut(wallet);
        if *balance < amount {
            return Err(AppError::InsufficientFunds { wallet });
        }
        *balance -= amount;
        state.entries.insert(
            key,
            LedgerRow {
                user_id,
                wallet,
                amount: -amount,
            },
        );
        Ok(LedgerOutcome::Applied)
    }

    async fn reverse(&self, reason: LedgerReason) -> AppResult<LedgerOutcome> {
        let mut state = lock(&self.ledger);
        let reversal_key = LedgerState::key(reason, LedgerEntryKind::Reversal);
        if state.entries.contains_key(&reversal_key) {
            return Ok(LedgerOutcome::Duplicate);
        }
        let original = state
            .entries
            .get(&LedgerState::key(reason, LedgerEntryKind::Credit))
            .or_else(|| {
                state
                    .entries
                    .get(&LedgerState::key(reason, LedgerEntryKind::Debit))
            })
            .copied();
        let Some(original) = original else {
            return Ok(LedgerOutcome::NothingToReverse);
        };

        let balances = state
            .balances
            .get_mut(&original.user_id)
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        let balance = balances.get_mut(original.wallet);
        if *balance < original.amount {
            // 入账已被花掉, 无法冲正
            return Err(AppError::InsufficientFunds {
                wallet: original.wallet,
            });
        }
        *balance -= original.amount;
        state.entries.insert(
            reversal_key,
            LedgerRow {
                amount: -original.amount,
                ..original
            },
        );
        Ok(LedgerOutcome::Applied)
    }

    async fn balances(&self, user_id: Uuid) -> AppResult<Option<WalletBalances>> {
        Ok(lock(&self.ledger).balances.get(&user_id).copied())
    }
}

#[async_trait]
impl OrderSequencer for MemoryStore {
    async fn next(&self) -> AppResult<i64> {
        Ok(self.next_order_number.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn competition(&self, id: Uuid) -> AppResult<Option<Competition>> {
        Ok(lock(&self.competitions).get(&id).cloned())
    }

    async fn record_sale(&self, competition_id: Uuid, quantity: i64) -> AppResult<()> {
        let mut competitions = lock(&self.competitions);
        let competition = competitions
            .get_mut(&competition_id)
            .ok_or_else(|| AppError::NotFound("Competition not found".into()))?;
        if competition.tickets_sold + quantity > competition.max_tickets {
            return Err(AppError::InternalError(format!(
                "tickets_sold of {competition_id} would exceed max_tickets"
            )));
        }
        competition.tickets_sold += quantity;
        Ok(())
    }

    async fn coupon(&self, code: &str) -> AppResult<Option<Coupon>> {
        Ok(lock(&self.coupons).get(&code.trim().to_uppercase()).cloned())
    }

    async fn redeem_coupon(&self, code: &str) -> AppResult<bool> {
        let mut coupons = lock(&self.coupons);
        match coupons.get_mut(&code.trim().to_uppercase()) {
            Some(coupon) if coupon.is_redeemable() => {
                coupon.times_used += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, order: &Order) -> AppResult<()> {
        let mut orders = lock(&self.orders);
        if orders.contains_key(&order.id)
            || orders
                .values()
                .any(|o| o.order.order_number == order.order_number)
        {
            return Err(AppError::InternalError(format!(
                "Duplicate order {} / #{}",
                order.id, order.order_number
            )));
        }
        orders.insert(
            order.id,
            StoredOrder {
                order: order.clone(),
                settling: false,
            },
        );
        Ok(())
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Order>> {
        Ok(lock(&self.orders).get(&id).map(|o| o.order.clone()))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        params: &PaginationParams,
    ) -> AppResult<(Vec<Order>, u64)> {
        let mut orders: Vec<Order> = lock(&self.orders)
            .values()
            .filter(|o| o.order.user_id == user_id)
            .map(|o| o.order.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = orders.len() as u64;
        let page = orders
            .into_iter()
            .skip(params.get_offset() as usize)
            .take(params.get_limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn attach_payment_job(&self, id: Uuid, job_reference: &str) -> AppResult<()> {
        let mut orders = lock(&self.orders);
        let stored = orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Order not found".into()))?;
        stored.order.payment_job_reference = Some(job_reference.to_string());
        Ok(())
    }

    async fn begin_settlement(&self, id: Uuid) -> AppResult<bool> {
        let mut orders = lock(&self.orders);
        match orders.get_mut(&id) {
            Some(stored)
                if stored.order.payment_status == PaymentStatus::Pending && !stored.settling =>
            {
                stored.settling = true;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::NotFound("Order not found".into())),
        }
    }

    async fn complete(&self, id: Uuid, tickets: &[CompetitionTickets]) -> AppResult<bool> {
        let mut orders = lock(&self.orders);
        match orders.get_mut(&id) {
            Some(stored) if stored.order.payment_status == PaymentStatus::Pending => {
                stored.order.payment_status = PaymentStatus::Completed;
                stored.order.tickets = tickets.to_vec();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::NotFound("Order not found".into())),
        }
    }

    async fn fail(&self, id: Uuid) -> AppResult<bool> {
        self.fail_pending(id, false)
    }

    async fn fail_settlement(&self, id: Uuid) -> AppResult<bool> {
        self.fail_pending(id, true)
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn cart(&self, user_id: Uuid) -> AppResult<Option<Cart>> {
        Ok(lock(&self.carts).get(&user_id).cloned())
    }

    async fn clear(&self, user_id: Uuid) -> AppResult<()> {
        if let Some(cart) = lock(&self.carts).get_mut(&user_id) {
            cart.items.clear();
            cart.coupon_code = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PaymentMethod;

    fn card_order() -> Order {
        Order::pending(
            1000,
            Uuid::new_v4(),
            100,
            0,
            None,
            PaymentMethod::Card,
            Vec::new(),
        )
    }

    fn store_with_user(balances: WalletBalances) -> (MemoryStore, Uuid) {
        let store = MemoryStore::new(1000);
        let user_id = Uuid::new_v4();
        store.add_user(user_id, balances);
        (store, user_id)
    }

    #[tokio::test]
    async fn test_claim_is_insert_if_absent() {
        let store = MemoryStore::new(1000);
        let competition_id = Uuid::new_v4();
        let first = Ticket::new(competition_id, 7, Uuid::new_v4(), Uuid::new_v4(), None);
        let second = Ticket::new(competition_id, 7, Uuid::new_v4(), Uuid::new_v4(), None);

        assert_eq!(store.claim(&first).await.unwrap(), ClaimOutcome::Claimed);
        assert_eq!(
            store.claim(&second).await.unwrap(),
            ClaimOutcome::AlreadyTaken
        );
        assert_eq!(store.count_live(competition_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_release_only_removes_owned_claim() {
        let store = MemoryStore::new(1000);
        let competition_id = Uuid::new_v4();
        let ticket = Ticket::new(competition_id, 3, Uuid::new_v4(), Uuid::new_v4(), None);
        store.claim(&ticket).await.unwrap();

        store
            .release(competition_id, 3, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(store.count_live(competition_id).await.unwrap(), 1);

        store
            .release(competition_id, 3, ticket.order_id)
            .await
            .unwrap();
        assert_eq!(store.count_live(competition_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_credit_replay_is_noop() {
        let (store, user_id) = store_with_user(WalletBalances::default());
        let reason = LedgerReason::Ticket(Uuid::new_v4());

        let first = store
            .credit(user_id, WalletType::Cash, 500, reason)
            .await
            .unwrap();
        let second = store
            .credit(user_id, WalletType::Cash, 500, reason)
            .await
            .unwrap();

        assert_eq!(first, LedgerOutcome::Applied);
        assert_eq!(second, LedgerOutcome::Duplicate);
        let balances = store.balances(user_id).await.unwrap().unwrap();
        assert_eq!(balances.cash_balance, 500);
    }

    #[tokio::test]
    async fn test_debit_rechecks_balance() {
        let (store, user_id) = store_with_user(WalletBalances {
            site_credit_balance: 10,
            cash_balance: 0,
        });

        let err = store
            .debit(
                user_id,
                WalletType::SiteCredit,
                15,
                LedgerReason::Order(Uuid::new_v4()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { .. }));

        let balances = store.balances(user_id).await.unwrap().unwrap();
        assert_eq!(balances.site_credit_balance, 10);
        assert_eq!(store.ledger_entry_count(), 0);
    }

    #[tokio::test]
    async fn test_reverse_undoes_once() {
        let (store, user_id) = store_with_user(WalletBalances {
            site_credit_balance: 100,
            cash_balance: 0,
        });
        let reason = LedgerReason::Order(Uuid::new_v4());
        store
            .debit(user_id, WalletType::SiteCredit, 40, reason)
            .await
            .unwrap();

        assert_eq!(
            store.reverse(reason).await.unwrap(),
            LedgerOutcome::Applied
        );
        assert_eq!(
            store.reverse(reason).await.unwrap(),
            LedgerOutcome::Duplicate
        );
        assert_eq!(
            store
                .reverse(LedgerReason::Ticket(Uuid::new_v4()))
                .await
                .unwrap(),
            LedgerOutcome::NothingToReverse
        );

        let balances = store.balances(user_id).await.unwrap().unwrap();
        assert_eq!(balances.site_credit_balance, 100);
    }

    #[tokio::test]
    async fn test_external_failure_cannot_override_settlement() {
        let store = MemoryStore::new(1000);
        let order = card_order();
        store.insert(&order).await.unwrap();

        assert!(store.begin_settlement(order.id).await.unwrap());
        assert!(!store.fail(order.id).await.unwrap());
        let current = store.find(order.id).await.unwrap().unwrap();
        assert_eq!(current.payment_status, PaymentStatus::Pending);

        assert!(store.fail_settlement(order.id).await.unwrap());
        let current = store.find(order.id).await.unwrap().unwrap();
        assert_eq!(current.payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_external_failure_before_settlement() {
        let store = MemoryStore::new(1000);
        let order = card_order();
        store.insert(&order).await.unwrap();

        assert!(!store.fail_settlement(order.id).await.unwrap());
        assert!(store.fail(order.id).await.unwrap());
        assert!(!store.begin_settlement(order.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_sequencer_starts_at_configured_value() {
        let store = MemoryStore::new(1000);
        assert_eq!(store.next().await.unwrap(), 1000);
        assert_eq!(store.next().await.unwrap(), 1001);
    }
}
