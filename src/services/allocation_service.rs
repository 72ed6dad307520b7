use crate::error::{AppError, AppResult};
use crate::models::{LedgerOutcome, LedgerReason, PrizeDescriptor, Ticket};
use crate::services::instant_win;
use crate::store::{ClaimOutcome, TicketPool, WalletLedger};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

/// Attempts made for every compensation step before it is left for reconciliation.
pub const COMPENSATION_ATTEMPTS: u32 = 3;

/// Source of candidate ticket numbers.
pub trait TicketDraw: Send + Sync {
    /// A number in `[1, max]`; `max` is always positive.
    fn draw(&self, max: i64) -> i64;
}

/// Uniform draw from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomDraw;

impl TicketDraw for RandomDraw {
    fn draw(&self, max: i64) -> i64 {
        rand::thread_rng().gen_range(1..=max)
    }
}

/// Reproducible draw for tests and load replays.
pub struct SeededDraw {
    rng: Mutex<StdRng>,
}

impl SeededDraw {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl TicketDraw for SeededDraw {
    fn draw(&self, max: i64) -> i64 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(1..=max)
    }
}

/// Hands out a fixed sequence first, then falls back to a seeded draw.
pub struct ScriptedDraw {
    script: Mutex<VecDeque<i64>>,
    fallback: SeededDraw,
}

impl ScriptedDraw {
    pub fn new(numbers: impl IntoIterator<Item = i64>) -> Self {
        Self {
            script: Mutex::new(numbers.into_iter().collect()),
            fallback: SeededDraw::new(0),
        }
    }
}

impl TicketDraw for ScriptedDraw {
    fn draw(&self, max: i64) -> i64 {
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(n) => n.clamp(1, max),
            None => self.fallback.draw(max),
        }
    }
}

/// One order line to allocate.
#[derive(Debug, Clone, Copy)]
pub struct AllocationRequest<'a> {
    pub competition_id: Uuid,
    pub quantity: u32,
    pub max_tickets: i64,
    pub prizes: &'a [PrizeDescriptor],
    pub order_id: Uuid,
    pub user_id: Uuid,
}

/// Tickets claimed for one line; `numbers` is ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub competition_id: Uuid,
    pub numbers: Vec<i64>,
    pub tickets: Vec<Ticket>,
}

impl Allocation {
    fn empty(competition_id: Uuid) -> Self {
        Self {
            competition_id,
            numbers: Vec::new(),
            tickets: Vec::new(),
        }
    }
}

/// Runs `op` up to `COMPENSATION_ATTEMPTS` times. Returns whether it eventually
/// succeeded; a final failure is logged for manual reconciliation.
pub(crate) async fn retry_compensation<T, F, Fut>(what: impl Display, mut op: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    for attempt in 1..=COMPENSATION_ATTEMPTS {
        match op().await {
            Ok(_) => return true,
            Err(e) if attempt < COMPENSATION_ATTEMPTS => {
                warn!("Compensation '{what}' failed (attempt {attempt}): {e}");
                tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
            }
            Err(e) => {
                error!("RECONCILIATION required: compensation '{what}' failed after {attempt} attempts: {e}");
            }
        }
    }
    false
}

/// 票号分配
///
/// Draws random numbers, claims them one by one in the ticket pool and credits
/// instant wins as they are secured. A call either returns every requested
/// ticket or leaves nothing behind.
#[derive(Clone)]
pub struct AllocationService {
    tickets: Arc<dyn TicketPool>,
    ledger: Arc<dyn WalletLedger>,
    draw: Arc<dyn TicketDraw>,
    attempt_factor: u32,
}

impl AllocationService {
    pub fn new(
        tickets: Arc<dyn TicketPool>,
        ledger: Arc<dyn WalletLedger>,
        draw: Arc<dyn TicketDraw>,
        attempt_factor: u32,
    ) -> Self {
        Self {
            tickets,
            ledger,
            draw,
            attempt_factor: attempt_factor.max(1),
        }
    }

    pub async fn allocate(&self, request: AllocationRequest<'_>) -> AppResult<Allocation> {
        let mut allocation = Allocation::empty(request.competition_id);
        if request.quantity == 0 {
            return Ok(allocation);
        }
        let failed = |secured: usize| AppError::AllocationFailed {
            competition_id: request.competition_id,
            requested: request.quantity,
            secured: secured as u32,
        };
        // 请求数量超过号码池时无需尝试
        if request.max_tickets <= 0 || i64::from(request.quantity) > request.max_tickets {
            return Err(failed(0));
        }

        let wanted = request.quantity as usize;
        let max_attempts = u64::from(request.quantity) * u64::from(self.attempt_factor);
        let mut attempts = 0u64;

        while allocation.tickets.len() < wanted && attempts < max_attempts {
            attempts += 1;
            let number = self.draw.draw(request.max_tickets);
            let win = instant_win::resolve(number, request.prizes);
            let ticket = Ticket::new(
                request.competition_id,
                number,
                request.order_id,
                request.user_id,
                win,
            );

            match self.tickets.claim(&ticket).await {
                Ok(ClaimOutcome::Claimed) => {}
                Ok(ClaimOutcome::AlreadyTaken) => {
                    debug!(
                        "Ticket {number} of competition {} already taken",
                        request.competition_id
                    );
                    continue;
                }
                Err(e) => {
                    self.compensate(&allocation).await;
                    return Err(e);
                }
            }

            if let Some(prize) = ticket.payable_win() {
                let credited = self
                    .ledger
                    .credit(
                        request.user_id,
                        prize.wallet_type,
                        prize.amount,
                        LedgerReason::Ticket(ticket.id),
                    )
                    .await;
                if let Err(e) = credited {
                    // 该票号已占用, 一并回滚
                    allocation.tickets.push(ticket);
                    self.compensate(&allocation).await;
                    return Err(e);
                }
                info!(
                    "Instant win '{}' on ticket {number} of competition {} for user {}",
                    prize.label, request.competition_id, request.user_id
                );
            }
            allocation.tickets.push(ticket);
        }

        if allocation.tickets.len() < wanted {
            let err = failed(allocation.tickets.len());
            warn!("{err} after {attempts} attempts, max_tickets {}", request.max_tickets);
            self.compensate(&allocation).await;
            return Err(err);
        }

        allocation.numbers = allocation.tickets.iter().map(|t| t.ticket_number).collect();
        allocation.numbers.sort_unstable();
        Ok(allocation)
    }

    /// Undoes an allocation: reverses every instant win credit, then releases every claim.
    /// Each step is retried; whatever still fails is logged for reconciliation.
    pub async fn compensate(&self, allocation: &Allocation) {
        for ticket in &allocation.tickets {
            if ticket.payable_win().is_some() {
                let reason = LedgerReason::Ticket(ticket.id);
                let ledger = self.ledger.clone();
                retry_compensation(format!("reverse {reason}"), || {
                    let ledger = ledger.clone();
                    async move {
                        match ledger.reverse(reason).await? {
                            LedgerOutcome::NothingToReverse => {
                                debug!("No credit recorded for {reason}");
                            }
                            LedgerOutcome::Applied | LedgerOutcome::Duplicate => {}
                        }
                        Ok::<(), AppError>(())
                    }
                })
                .await;
            }

            let tickets = self.tickets.clone();
            let (competition_id, number, order_id) =
                (ticket.competition_id, ticket.ticket_number, ticket.order_id);
            retry_compensation(
                format!("release ticket {number} of competition {competition_id}"),
                || {
                    let tickets = tickets.clone();
                    async move { tickets.release(competition_id, number, order_id).await }
                },
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::WalletType;
    use crate::models::WalletBalances;
    use crate::store::MemoryStore;

    fn service(store: &Arc<MemoryStore>, draw: Arc<dyn TicketDraw>) -> AllocationService {
        AllocationService::new(store.clone(), store.clone(), draw, 50)
    }

    fn request(competition_id: Uuid, quantity: u32, max_tickets: i64) -> AllocationRequest<'static> {
        AllocationRequest {
            competition_id,
            quantity,
            max_tickets,
            prizes: &[],
            order_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_seeded_draw_is_reproducible_and_in_range() {
        let a = SeededDraw::new(7);
        let b = SeededDraw::new(7);
        for _ in 0..100 {
            let n = a.draw(10);
            assert_eq!(n, b.draw(10));
            assert!((1..=10).contains(&n));
        }
    }

    #[test]
    fn test_scripted_draw_then_fallback() {
        let draw = ScriptedDraw::new([3, 99]);
        assert_eq!(draw.draw(10), 3);
        assert_eq!(draw.draw(10), 10);
        assert!((1..=10).contains(&draw.draw(10)));
    }

    #[tokio::test]
    async fn test_zero_quantity_is_empty() {
        let store = Arc::new(MemoryStore::new(1000));
        let allocation = service(&store, Arc::new(RandomDraw))
            .allocate(request(Uuid::new_v4(), 0, 10))
            .await
            .unwrap();
        assert!(allocation.numbers.is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_capacity_fails_immediately() {
        let store = Arc::new(MemoryStore::new(1000));
        let err = service(&store, Arc::new(RandomDraw))
            .allocate(request(Uuid::new_v4(), 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AllocationFailed { secured: 0, .. }));
    }

    struct CountingDraw(std::sync::atomic::AtomicU32);

    impl TicketDraw for CountingDraw {
        fn draw(&self, max: i64) -> i64 {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            max
        }
    }

    #[tokio::test]
    async fn test_quantity_above_pool_fails_without_drawing() {
        let store = Arc::new(MemoryStore::new(1000));
        let draw = Arc::new(CountingDraw(Default::default()));
        let competition_id = Uuid::new_v4();
        let err = service(&store, draw.clone())
            .allocate(request(competition_id, 6, 5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::AllocationFailed {
                requested: 6,
                secured: 0,
                ..
            }
        ));
        assert_eq!(draw.0.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(store.count_live(competition_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_allocates_whole_pool() {
        let store = Arc::new(MemoryStore::new(1000));
        let competition_id = Uuid::new_v4();
        let allocation = service(&store, Arc::new(SeededDraw::new(1)))
            .allocate(request(competition_id, 5, 5))
            .await
            .unwrap();
        assert_eq!(allocation.numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(store.count_live(competition_id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_credit_failure_releases_the_claim() {
        let store = Arc::new(MemoryStore::new(1000));
        let competition_id = Uuid::new_v4();
        let prizes = vec![PrizeDescriptor::new("£1", [1], 100, WalletType::Cash)];
        // 用户不存在, 入账失败
        let req = AllocationRequest {
            prizes: &prizes,
            ..request(competition_id, 1, 1)
        };

        let err = service(&store, Arc::new(ScriptedDraw::new([1])))
            .allocate(req)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(store.count_live(competition_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_compensate_reverses_credits() {
        let store = Arc::new(MemoryStore::new(1000));
        let user_id = Uuid::new_v4();
        store.add_user(user_id, WalletBalances::default());
        let competition_id = Uuid::new_v4();
        let prizes = vec![PrizeDescriptor::new("£5", [2], 500, WalletType::SiteCredit)];
        let svc = service(&store, Arc::new(ScriptedDraw::new([2])));

        let allocation = svc
            .allocate(AllocationRequest {
                prizes: &prizes,
                user_id,
                ..request(competition_id, 1, 10)
            })
            .await
            .unwrap();
        assert_eq!(
            store.balances(user_id).await.unwrap().unwrap().site_credit_balance,
            500
        );

        svc.compensate(&allocation).await;
        assert_eq!(
            store.balances(user_id).await.unwrap().unwrap().site_credit_balance,
            0
        );
        assert_eq!(store.count_live(competition_id).await.unwrap(), 0);
    }
}
