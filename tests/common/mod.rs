#![allow(dead_code)]

use async_trait::async_trait;
use prize_draw_backend::config::CheckoutConfig;
use prize_draw_backend::entities::WalletType;
use prize_draw_backend::error::AppResult;
use prize_draw_backend::external::{CardPayments, PaymentGateway, PaymentJob, PaymentJobRequest};
use prize_draw_backend::models::{
    Cart, CartLine, Competition, Coupon, LedgerOutcome, LedgerReason, PrizeDescriptor, Ticket,
    WalletBalances,
};
use prize_draw_backend::services::{AllocationService, CheckoutService, TicketDraw};
use prize_draw_backend::store::{ClaimOutcome, MemoryStore, Stores, TicketPool, WalletLedger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub allocation: AllocationService,
    pub checkout: CheckoutService,
}

pub fn harness(draw: Arc<dyn TicketDraw>, card_payments: CardPayments) -> Harness {
    let store = Arc::new(MemoryStore::new(1000));
    harness_with_stores(store.clone(), Stores::in_memory(store), draw, card_payments)
}

pub fn harness_with_stores(
    store: Arc<MemoryStore>,
    stores: Stores,
    draw: Arc<dyn TicketDraw>,
    card_payments: CardPayments,
) -> Harness {
    let allocation =
        AllocationService::new(stores.tickets.clone(), stores.ledger.clone(), draw, 50);
    let checkout = CheckoutService::new(
        stores,
        allocation.clone(),
        card_payments,
        CheckoutConfig::default(),
    );
    Harness {
        store,
        allocation,
        checkout,
    }
}

pub fn competition(max_tickets: i64, tickets_sold: i64, prizes: Vec<PrizeDescriptor>) -> Competition {
    Competition {
        id: Uuid::new_v4(),
        title: format!("Draw of {max_tickets}"),
        price: 100,
        max_tickets,
        tickets_sold,
        instant_wins: prizes,
    }
}

impl Harness {
    pub fn add_user(&self, site_credit_balance: i64, cash_balance: i64) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store.add_user(
            user_id,
            WalletBalances {
                site_credit_balance,
                cash_balance,
            },
        );
        user_id
    }

    pub fn add_competition(&self, competition: &Competition) {
        self.store.add_competition(competition.clone());
    }

    pub fn set_cart(
        &self,
        user_id: Uuid,
        lines: &[(&Competition, u32)],
        coupon_code: Option<&str>,
    ) {
        self.store.set_cart(Cart {
            user_id,
            items: lines
                .iter()
                .map(|(competition, quantity)| CartLine {
                    competition_id: competition.id,
                    title: competition.title.clone(),
                    unit_price: competition.price,
                    quantity: *quantity,
                })
                .collect(),
            coupon_code: coupon_code.map(str::to_string),
        });
    }

    pub fn add_coupon(&self, code: &str, discount_amount: i64, max_uses: i32) {
        self.store.add_coupon(Coupon {
            code: code.to_string(),
            discount_amount,
            is_active: true,
            max_uses,
            times_used: 0,
        });
    }

    pub async fn balances(&self, user_id: Uuid) -> WalletBalances {
        self.store.balances(user_id).await.unwrap().unwrap()
    }
}

/// Gateway double recording every job it was asked to create.
#[derive(Default)]
pub struct FakeGateway {
    pub jobs: Mutex<Vec<PaymentJobRequest>>,
    /// What `job_status` reports for every job.
    pub status: Mutex<String>,
    pub polls: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn report(&self, status: &str) {
        *self.status.lock().unwrap() = status.to_string();
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_job(&self, request: &PaymentJobRequest) -> AppResult<PaymentJob> {
        self.jobs.lock().unwrap().push(request.clone());
        Ok(PaymentJob {
            job_reference: format!("JOB-{}", request.reference),
            redirect_url: format!("https://pay.test/{}", request.reference),
        })
    }

    async fn job_status(&self, job_reference: &str) -> AppResult<String> {
        self.polls.lock().unwrap().push(job_reference.to_string());
        Ok(self.status.lock().unwrap().clone())
    }

    fn verify_webhook(&self, _body: &[u8], signature: &str) -> bool {
        signature == "valid"
    }
}

/// Ledger whose balance reads always look rich, so checkout gets past the early
/// balance check and the real debit is the one that fails.
pub struct OptimisticLedger {
    pub inner: Arc<MemoryStore>,
}

#[async_trait]
impl WalletLedger for OptimisticLedger {
    async fn credit(
        &self,
        user_id: Uuid,
        wallet: WalletType,
        amount: i64,
        reason: LedgerReason,
    ) -> AppResult<LedgerOutcome> {
        self.inner.credit(user_id, wallet, amount, reason).await
    }

    async fn debit(
        &self,
        user_id: Uuid,
        wallet: WalletType,
        amount: i64,
        reason: LedgerReason,
    ) -> AppResult<LedgerOutcome> {
        self.inner.debit(user_id, wallet, amount, reason).await
    }

    async fn reverse(&self, reason: LedgerReason) -> AppResult<LedgerOutcome> {
        self.inner.reverse(reason).await
    }

    async fn balances(&self, _user_id: Uuid) -> AppResult<Option<WalletBalances>> {
        Ok(Some(WalletBalances {
            site_credit_balance: i64::MAX,
            cash_balance: i64::MAX,
        }))
    }
}

/// Ticket pool that parks the first claim until `open` is called, so a test can
/// act while a settlement is half way through.
pub struct GatedPool {
    pub inner: Arc<MemoryStore>,
    armed: AtomicBool,
    pub entered: Notify,
    gate: Notify,
}

impl GatedPool {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            gate: Notify::new(),
        }
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl TicketPool for GatedPool {
    async fn claim(&self, ticket: &Ticket) -> AppResult<ClaimOutcome> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        self.inner.claim(ticket).await
    }

    async fn release(
        &self,
        competition_id: Uuid,
        ticket_number: i64,
        order_id: Uuid,
    ) -> AppResult<()> {
        self.inner.release(competition_id, ticket_number, order_id).await
    }

    async fn count_live(&self, competition_id: Uuid) -> AppResult<u64> {
        self.inner.count_live(competition_id).await
    }

    async fn tickets_for_order(&self, order_id: Uuid) -> AppResult<Vec<Ticket>> {
        self.inner.tickets_for_order(order_id).await
    }
}
