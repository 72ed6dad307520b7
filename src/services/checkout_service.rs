use crate::config::CheckoutConfig;
use crate::entities::{PaymentMethod, PaymentStatus, WalletType};
use crate::error::{AppError, AppResult, CheckoutError};
use crate::external::{CardPayments, PaymentJobRequest};
use crate::models::{
    Cart, CartLine, CheckoutResponse, CheckoutValidation, Competition, CompetitionTickets,
    LedgerOutcome, LedgerReason, Order,
};
use crate::services::allocation_service::{
    Allocation, AllocationRequest, AllocationService, retry_compensation,
};
use crate::services::instant_win;
use crate::store::Stores;
use log::{error, info, warn};
use std::collections::HashMap;
use uuid::Uuid;

/// How the gateway's payment status is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardPaymentStatus {
    Succeeded,
    Failed,
    /// Anything not yet final; the callback is ignored.
    Pending,
}

impl CardPaymentStatus {
    pub fn classify(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "captured" | "authorized" | "authorised" | "paid" | "success" | "successful"
            | "completed" => CardPaymentStatus::Succeeded,
            "declined" | "failed" | "cancelled" | "canceled" | "expired" | "rejected" => {
                CardPaymentStatus::Failed
            }
            _ => CardPaymentStatus::Pending,
        }
    }
}

/// A cart line joined with the competition it buys into.
struct SettlementLine {
    competition: Competition,
    title: String,
    quantity: u32,
}

struct PreparedCheckout {
    user_id: Uuid,
    method: PaymentMethod,
    lines: Vec<CartLine>,
    settlement: Vec<SettlementLine>,
    discount: i64,
    total: i64,
    coupon_code: Option<String>,
}

/// 结算编排
///
/// Validating → Reserving → Settling → Completed, or Compensating → Failed.
/// Wallet orders settle inside the request; card orders stop after creating the
/// payment job and settle in `confirm_card_payment` when the gateway reports back.
#[derive(Clone)]
pub struct CheckoutService {
    stores: Stores,
    allocation: AllocationService,
    card_payments: CardPayments,
    settings: CheckoutConfig,
}

impl CheckoutService {
    pub fn new(
        stores: Stores,
        allocation: AllocationService,
        card_payments: CardPayments,
        settings: CheckoutConfig,
    ) -> Self {
        Self {
            stores,
            allocation,
            card_payments,
            settings,
        }
    }

    pub fn card_payments(&self) -> &CardPayments {
        &self.card_payments
    }

    /// Availability check of the current cart without reserving anything.
    pub async fn validate_cart(&self, user_id: Uuid) -> AppResult<CheckoutValidation> {
        let mut issues = Vec::new();
        let cart = self.stores.carts.cart(user_id).await?;
        let Some(cart) = cart.filter(|c| !c.items.is_empty()) else {
            issues.push(CheckoutError::EmptyCart.to_string());
            return Ok(CheckoutValidation {
                valid: false,
                issues,
            });
        };

        let mut requested: HashMap<Uuid, i64> = HashMap::new();
        let mut competitions: HashMap<Uuid, Competition> = HashMap::new();
        for line in &cart.items {
            if line.quantity == 0 {
                issues.push(CheckoutError::InvalidQuantity(line.title.clone()).to_string());
                continue;
            }
            match self.stores.catalog.competition(line.competition_id).await? {
                Some(competition) => {
                    *requested.entry(competition.id).or_default() += i64::from(line.quantity);
                    competitions.insert(competition.id, competition);
                }
                None => issues.push(
                    CheckoutError::UnknownCompetition(line.competition_id.to_string()).to_string(),
                ),
            }
        }
        for (id, quantity) in &requested {
            if let Some(competition) = competitions.get(id)
                && *quantity > competition.available()
            {
                issues.push(format!(
                    "Only {} tickets left for '{}'",
                    competition.available(),
                    competition.title
                ));
            }
        }

        if let Some(code) = &cart.coupon_code {
            let coupon = self.stores.catalog.coupon(code).await?;
            if !coupon.is_some_and(|c| c.is_redeemable()) {
                issues.push(CheckoutError::InvalidCoupon(code.clone()).to_string());
            }
        }

        Ok(CheckoutValidation {
            valid: issues.is_empty(),
            issues,
        })
    }

    /// Turns the user's cart into an order paid with `payment_method`.
    pub async fn complete_checkout(
        &self,
        user_id: Uuid,
        payment_method: &str,
    ) -> AppResult<CheckoutResponse> {
        let prepared = self.prepare(user_id, payment_method).await?;
        match prepared.method.wallet() {
            Some(wallet) => self.settle_wallet_checkout(prepared, wallet).await,
            None => self.start_card_checkout(prepared).await,
        }
    }

    /// Applies a gateway status to a card order. Safe to call any number of times:
    /// an order that already left `pending` or is being settled is returned as is.
    pub async fn confirm_card_payment(
        &self,
        order_id: Uuid,
        external_status: &str,
    ) -> AppResult<Order> {
        let order = self.load_order(order_id).await?;
        if order.payment_method != PaymentMethod::Card {
            return Err(CheckoutError::NotCardOrder(order_id).into());
        }
        if order.payment_status.is_final() {
            info!(
                "Card callback for order {} ignored, already {:?}",
                order.id, order.payment_status
            );
            return Ok(order);
        }

        match CardPaymentStatus::classify(external_status) {
            CardPaymentStatus::Pending => {
                info!("Card payment for order {order_id} still '{external_status}'");
                Ok(order)
            }
            CardPaymentStatus::Failed => {
                if self.stores.orders.fail(order_id).await? {
                    info!("Card payment for order {order_id} failed: '{external_status}'");
                } else {
                    warn!(
                        "Card status '{external_status}' for order {order_id} ignored, a settlement owns the order"
                    );
                }
                self.load_order(order_id).await
            }
            CardPaymentStatus::Succeeded => {
                if !self.stores.orders.begin_settlement(order_id).await? {
                    info!("Order {order_id} is already being settled");
                    return self.load_order(order_id).await;
                }
                self.settle_card_order(order).await?;
                self.load_order(order_id).await
            }
        }
    }

    /// Polls the gateway for a card order whose callback never arrived and applies
    /// the reported status through `confirm_card_payment`.
    pub async fn reconcile_card_order(&self, order_id: Uuid) -> AppResult<Order> {
        let order = self.load_order(order_id).await?;
        if order.payment_method != PaymentMethod::Card {
            return Err(CheckoutError::NotCardOrder(order_id).into());
        }
        if order.payment_status.is_final() {
            return Ok(order);
        }
        let Some(gateway) = self.card_payments.gateway() else {
            return Err(CheckoutError::CardPaymentsUnavailable.into());
        };
        let Some(job_reference) = order.payment_job_reference.as_deref() else {
            return Err(AppError::ValidationError(format!(
                "Order {order_id} has no payment job"
            )));
        };

        let status = gateway.job_status(job_reference).await?;
        info!("Payment job {job_reference} of order {order_id} reports '{status}'");
        self.confirm_card_payment(order_id, &status).await
    }

    async fn load_order(&self, order_id: Uuid) -> AppResult<Order> {
        self.stores
            .orders
            .find(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".into()))
    }

    /// Validating: everything that can be rejected without touching shared state.
    async fn prepare(&self, user_id: Uuid, payment_method: &str) -> AppResult<PreparedCheckout> {
        let cart = self
            .stores
            .carts
            .cart(user_id)
            .await?
            .filter(|c| !c.items.is_empty())
            .ok_or(CheckoutError::EmptyCart)?;
        let method: PaymentMethod = payment_method
            .parse()
            .map_err(CheckoutError::InvalidPaymentMethod)?;

        let settlement = self.load_lines(&cart.items).await?;
        self.check_capacity(&settlement)?;

        let subtotal = cart.subtotal()?;
        let (discount, coupon_code) = self.apply_coupon(&cart, subtotal).await?;
        let total = (subtotal - discount).max(0);

        match method.wallet() {
            Some(wallet) if total > 0 => {
                let balances = self
                    .stores
                    .ledger
                    .balances(user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("User not found".into()))?;
                if balances.get(wallet) < total {
                    return Err(AppError::InsufficientFunds { wallet });
                }
            }
            Some(_) => {}
            None => {
                if total <= 0 {
                    return Err(CheckoutError::ZeroCardTotal.into());
                }
                if !self.card_payments.is_enabled() {
                    return Err(CheckoutError::CardPaymentsUnavailable.into());
                }
            }
        }

        Ok(PreparedCheckout {
            user_id,
            method,
            lines: cart.items,
            settlement,
            discount,
            total,
            coupon_code,
        })
    }

    async fn load_lines(&self, lines: &[CartLine]) -> AppResult<Vec<SettlementLine>> {
        let mut settlement = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity == 0 {
                return Err(CheckoutError::InvalidQuantity(line.title.clone()).into());
            }
            let competition = self
                .stores
                .catalog
                .competition(line.competition_id)
                .await?
                .ok_or_else(|| CheckoutError::UnknownCompetition(line.competition_id.to_string()))?;
            settlement.push(SettlementLine {
                title: competition.title.clone(),
                competition,
                quantity: line.quantity,
            });
        }
        Ok(settlement)
    }

    /// Pre-flight against the sold counter; the ticket pool still has the final word.
    fn check_capacity(&self, lines: &[SettlementLine]) -> AppResult<()> {
        let mut requested: HashMap<Uuid, (i64, &Competition)> = HashMap::new();
        for line in lines {
            let entry = requested
                .entry(line.competition.id)
                .or_insert((0, &line.competition));
            entry.0 += i64::from(line.quantity);
        }
        for (quantity, competition) in requested.values() {
            if *quantity > competition.available() {
                return Err(AppError::CapacityExhausted {
                    competition_id: competition.id,
                    available: competition.available(),
                });
            }
        }
        Ok(())
    }

    async fn apply_coupon(&self, cart: &Cart, subtotal: i64) -> AppResult<(i64, Option<String>)> {
        let Some(code) = &cart.coupon_code else {
            return Ok((0, None));
        };
        let coupon = self
            .stores
            .catalog
            .coupon(code)
            .await?
            .filter(|c| c.is_redeemable())
            .ok_or_else(|| CheckoutError::InvalidCoupon(code.clone()))?;
        Ok((
            coupon.discount_amount.clamp(0, subtotal.max(0)),
            Some(coupon.code),
        ))
    }

    /// Reserving: order number plus a `pending` order carrying the line snapshot.
    async fn reserve(&self, prepared: &PreparedCheckout) -> AppResult<Order> {
        let order_number = self.stores.sequencer.next().await?;
        let order = Order::pending(
            order_number,
            prepared.user_id,
            prepared.total,
            prepared.discount,
            prepared.coupon_code.clone(),
            prepared.method,
            prepared.lines.clone(),
        );
        self.stores.orders.insert(&order).await?;
        info!(
            "Order #{} ({}) reserved for user {}: {} tickets, total {}",
            order.order_number, order.id, order.user_id, order.ticket_count, order.total
        );
        Ok(order)
    }

    async fn settle_wallet_checkout(
        &self,
        prepared: PreparedCheckout,
        wallet: WalletType,
    ) -> AppResult<CheckoutResponse> {
        let mut order = self.reserve(&prepared).await?;
        if !self.stores.orders.begin_settlement(order.id).await? {
            return Err(AppError::InternalError(format!(
                "Order {} is already being settled",
                order.id
            )));
        }

        let allocations = match self.allocate_lines(&order, &prepared.settlement).await {
            Ok(allocations) => allocations,
            Err(e) => {
                self.mark_failed(order.id).await;
                return Err(e);
            }
        };

        if order.total > 0 {
            let debited = self
                .stores
                .ledger
                .debit(
                    order.user_id,
                    wallet,
                    order.total,
                    LedgerReason::Order(order.id),
                )
                .await;
            if let Err(e) = debited {
                self.compensate_all(&allocations).await;
                self.mark_failed(order.id).await;
                return Err(e);
            }
        }

        let summary = summarize(&prepared.settlement, &allocations);
        if let Err(e) = self.commit(&order, &summary).await {
            self.refund_wallet_payment(&order).await;
            self.compensate_all(&allocations).await;
            self.mark_failed(order.id).await;
            return Err(e);
        }

        self.after_commit(&order, &prepared.settlement).await;
        order.payment_status = PaymentStatus::Completed;
        order.tickets = summary;
        Ok(CheckoutResponse::from_order(&order, None))
    }

    async fn start_card_checkout(&self, prepared: PreparedCheckout) -> AppResult<CheckoutResponse> {
        let Some(gateway) = self.card_payments.gateway().cloned() else {
            return Err(CheckoutError::CardPaymentsUnavailable.into());
        };
        let mut order = self.reserve(&prepared).await?;

        let request = PaymentJobRequest {
            amount: order.total,
            currency: self.settings.currency.clone(),
            reference: order.id.to_string(),
            description: format!("Order #{}", order.order_number),
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
        };
        let job = match gateway.create_job(&request).await {
            Ok(job) => job,
            Err(e) => {
                let orders = self.stores.orders.clone();
                let order_id = order.id;
                retry_compensation(format!("mark order {order_id} failed"), || {
                    let orders = orders.clone();
                    async move { orders.fail(order_id).await }
                })
                .await;
                return Err(e);
            }
        };

        self.stores
            .orders
            .attach_payment_job(order.id, &job.job_reference)
            .await?;
        order.payment_job_reference = Some(job.job_reference);
        Ok(CheckoutResponse::from_order(&order, Some(job.redirect_url)))
    }

    /// Settling of a card order whose payment the gateway reported as captured.
    async fn settle_card_order(&self, order: Order) -> AppResult<()> {
        let allocated = match self.load_lines(&order.lines).await {
            Ok(lines) => self
                .allocate_lines(&order, &lines)
                .await
                .map(|allocations| (lines, allocations)),
            Err(e) => Err(e),
        };

        let (lines, allocations) = match allocated {
            Ok(allocated) => allocated,
            Err(e) => {
                self.mark_failed(order.id).await;
                error!(
                    "RECONCILIATION required: card payment for order #{} ({}) captured but tickets could not be allocated, refund {} to user {}: {e}",
                    order.order_number, order.id, order.total, order.user_id
                );
                return Ok(());
            }
        };

        let summary = summarize(&lines, &allocations);
        if let Err(e) = self.commit(&order, &summary).await {
            self.compensate_all(&allocations).await;
            self.mark_failed(order.id).await;
            error!(
                "RECONCILIATION required: card order #{} ({}) paid but could not be completed: {e}",
                order.order_number, order.id
            );
            return Err(e);
        }

        info!(
            "Card order #{} ({}) completed with {} tickets",
            order.order_number, order.id, order.ticket_count
        );
        self.after_commit(&order, &lines).await;
        Ok(())
    }

    /// Allocates every line; a failing line unwinds the lines before it.
    async fn allocate_lines(
        &self,
        order: &Order,
        lines: &[SettlementLine],
    ) -> AppResult<Vec<Allocation>> {
        let mut allocations = Vec::with_capacity(lines.len());
        for line in lines {
            let request = AllocationRequest {
                competition_id: line.competition.id,
                quantity: line.quantity,
                max_tickets: line.competition.max_tickets,
                prizes: &line.competition.instant_wins,
                order_id: order.id,
                user_id: order.user_id,
            };
            match self.allocation.allocate(request).await {
                Ok(allocation) => allocations.push(allocation),
                Err(e) => {
                    self.compensate_all(&allocations).await;
                    return Err(e);
                }
            }
        }
        Ok(allocations)
    }

    async fn compensate_all(&self, allocations: &[Allocation]) {
        for allocation in allocations.iter().rev() {
            self.allocation.compensate(allocation).await;
        }
    }

    /// Commit point: `pending` → `completed`. A lost acknowledgement is resolved by re-reading.
    async fn commit(&self, order: &Order, summary: &[CompetitionTickets]) -> AppResult<()> {
        let committed = match self.stores.orders.complete(order.id, summary).await {
            Ok(committed) => committed,
            Err(e) => match self.stores.orders.find(order.id).await {
                Ok(Some(current)) if current.payment_status == PaymentStatus::Completed => true,
                _ => return Err(e),
            },
        };
        if committed {
            Ok(())
        } else {
            Err(AppError::InternalError(format!(
                "Order {} left pending before it could be completed",
                order.id
            )))
        }
    }

    async fn refund_wallet_payment(&self, order: &Order) {
        let reason = LedgerReason::Order(order.id);
        let ledger = self.stores.ledger.clone();
        retry_compensation(format!("reverse {reason}"), || {
            let ledger = ledger.clone();
            async move {
                let outcome = ledger.reverse(reason).await?;
                Ok::<LedgerOutcome, AppError>(outcome)
            }
        })
        .await;
    }

    /// Ends a settlement this call owns.
    async fn mark_failed(&self, order_id: Uuid) {
        let orders = self.stores.orders.clone();
        retry_compensation(format!("mark order {order_id} failed"), || {
            let orders = orders.clone();
            async move { orders.fail_settlement(order_id).await }
        })
        .await;
    }

    /// Post-commit bookkeeping. The order stands regardless; failures are only logged.
    async fn after_commit(&self, order: &Order, lines: &[SettlementLine]) {
        if let Some(code) = &order.coupon_code {
            match self.stores.catalog.redeem_coupon(code).await {
                Ok(true) => {}
                Ok(false) => warn!(
                    "Coupon '{code}' was exhausted before order #{} redeemed it",
                    order.order_number
                ),
                Err(e) => error!(
                    "Failed to redeem coupon '{code}' for order #{}: {e}",
                    order.order_number
                ),
            }
        }

        if let Err(e) = self.stores.carts.clear(order.user_id).await {
            error!("Failed to clear cart of user {}: {e}", order.user_id);
        }

        for line in lines {
            if let Err(e) = self
                .stores
                .catalog
                .record_sale(line.competition.id, i64::from(line.quantity))
                .await
            {
                error!(
                    "Failed to record {} sold tickets of competition {} for order #{}: {e}",
                    line.quantity, line.competition.id, order.order_number
                );
            }
        }
    }
}

fn summarize(lines: &[SettlementLine], allocations: &[Allocation]) -> Vec<CompetitionTickets> {
    lines
        .iter()
        .zip(allocations)
        .map(|(line, allocation)| CompetitionTickets {
            competition_id: allocation.competition_id,
            title: line.title.clone(),
            numbers: allocation.numbers.clone(),
            instant_wins: instant_win::group_instant_wins(&allocation.tickets),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_card_status() {
        assert_eq!(
            CardPaymentStatus::classify("Captured"),
            CardPaymentStatus::Succeeded
        );
        assert_eq!(
            CardPaymentStatus::classify(" paid "),
            CardPaymentStatus::Succeeded
        );
        assert_eq!(
            CardPaymentStatus::classify("DECLINED"),
            CardPaymentStatus::Failed
        );
        assert_eq!(
            CardPaymentStatus::classify("cancelled"),
            CardPaymentStatus::Failed
        );
        assert_eq!(
            CardPaymentStatus::classify("processing"),
            CardPaymentStatus::Pending
        );
        assert_eq!(CardPaymentStatus::classify(""), CardPaymentStatus::Pending);
    }
}
