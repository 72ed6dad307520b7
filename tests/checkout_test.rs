mod common;

use common::{FakeGateway, OptimisticLedger, competition, harness, harness_with_stores};
use prize_draw_backend::entities::{PaymentMethod, PaymentStatus, WalletType};
use prize_draw_backend::error::{AppError, CheckoutError};
use prize_draw_backend::external::CardPayments;
use prize_draw_backend::models::{PrizeDescriptor, Ticket};
use prize_draw_backend::services::{ScriptedDraw, SeededDraw};
use prize_draw_backend::store::{CartRepository, MemoryStore, OrderRepository, Stores, TicketPool};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_site_credit_checkout_completes_order() {
    let h = harness(Arc::new(SeededDraw::new(11)), CardPayments::Disabled);
    let draw = competition(100, 0, vec![]);
    h.add_competition(&draw);
    let user_id = h.add_user(1_000, 0);
    h.set_cart(user_id, &[(&draw, 3)], None);

    let response = h
        .checkout
        .complete_checkout(user_id, "site_credit")
        .await
        .unwrap();

    assert_eq!(response.order_number, 1000);
    assert_eq!(response.payment_status, PaymentStatus::Completed);
    assert_eq!(response.total, 300);
    assert_eq!(response.tickets.len(), 1);
    let numbers = &response.tickets[0].numbers;
    assert_eq!(numbers.len(), 3);
    assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    assert!(numbers.iter().all(|n| (1..=100).contains(n)));

    assert_eq!(h.balances(user_id).await.site_credit_balance, 700);
    assert_eq!(h.store.sold(draw.id), Some(3));
    assert!(h.store.cart(user_id).await.unwrap().unwrap().items.is_empty());

    let order = h.store.find(response.order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.tickets, response.tickets);
}

#[tokio::test]
async fn test_scenario_a_instant_win_credits_exact_amount() {
    let h = harness(Arc::new(ScriptedDraw::new([123])), CardPayments::Disabled);
    let prize = PrizeDescriptor::new("£50", [123, 456], 50, WalletType::SiteCredit);
    let draw = competition(10_000, 0, vec![prize]);
    h.add_competition(&draw);
    let user_id = h.add_user(100, 0);
    h.set_cart(user_id, &[(&draw, 1)], None);

    let response = h
        .checkout
        .complete_checkout(user_id, "site_credit")
        .await
        .unwrap();

    let line = &response.tickets[0];
    assert_eq!(line.numbers, vec![123]);
    assert_eq!(line.instant_wins.len(), 1);
    assert_eq!(line.instant_wins[0].prize, "£50");
    assert_eq!(line.instant_wins[0].ticket_numbers, vec![123]);

    let tickets = h.store.tickets_for_order(response.order_id).await.unwrap();
    assert!(tickets[0].is_instant_win());
    assert_eq!(tickets[0].win.as_ref().unwrap().amount, 50);

    // 100 - 100 (ticket) + 50 (win)
    assert_eq!(h.balances(user_id).await.site_credit_balance, 50);
}

#[tokio::test]
async fn test_scenario_b_sold_out_competition_is_rejected() {
    let h = harness(Arc::new(SeededDraw::new(3)), CardPayments::Disabled);
    let draw = competition(5, 5, vec![]);
    h.add_competition(&draw);
    for n in 1..=5 {
        h.store
            .seed_ticket(Ticket::new(draw.id, n, Uuid::new_v4(), Uuid::new_v4(), None));
    }
    let user_id = h.add_user(1_000, 0);
    h.set_cart(user_id, &[(&draw, 1)], None);

    let err = h
        .checkout
        .complete_checkout(user_id, "site_credit")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::CapacityExhausted { available: 0, .. }
    ));
    assert_eq!(h.balances(user_id).await.site_credit_balance, 1_000);
    assert_eq!(h.store.count_live(draw.id).await.unwrap(), 5);
}

#[tokio::test]
async fn test_scenario_c_insufficient_site_credit() {
    let h = harness(Arc::new(SeededDraw::new(5)), CardPayments::Disabled);
    let mut draw = competition(100, 0, vec![]);
    draw.price = 15;
    h.add_competition(&draw);
    let user_id = h.add_user(10, 0);
    h.set_cart(user_id, &[(&draw, 1)], None);

    let err = h
        .checkout
        .complete_checkout(user_id, "site_credit")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::InsufficientFunds {
            wallet: WalletType::SiteCredit
        }
    ));
    assert_eq!(h.store.count_live(draw.id).await.unwrap(), 0);
    let (orders, total) = h
        .store
        .list_for_user(user_id, &Default::default())
        .await
        .unwrap();
    assert_eq!(total, 0);
    assert!(orders.is_empty());
    assert_eq!(h.balances(user_id).await.site_credit_balance, 10);
}

#[tokio::test]
async fn test_failed_debit_unwinds_tickets_and_wins() {
    let store = Arc::new(MemoryStore::new(1000));
    let mut stores = Stores::in_memory(store.clone());
    stores.ledger = Arc::new(OptimisticLedger {
        inner: store.clone(),
    });
    let h = harness_with_stores(
        store,
        stores,
        Arc::new(ScriptedDraw::new([7, 8])),
        CardPayments::Disabled,
    );

    let prize = PrizeDescriptor::new("£1 cash", [7], 100, WalletType::Cash);
    let mut draw = competition(50, 0, vec![prize]);
    draw.price = 500;
    h.add_competition(&draw);
    let user_id = h.add_user(10, 0);
    h.set_cart(user_id, &[(&draw, 2)], None);

    let err = h
        .checkout
        .complete_checkout(user_id, "site_credit")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds { .. }));

    // 中奖入账已冲正, 票号已释放, 订单为 failed, 购物车保留
    let balances = h.balances(user_id).await;
    assert_eq!(balances.cash_balance, 0);
    assert_eq!(balances.site_credit_balance, 10);
    assert_eq!(h.store.count_live(draw.id).await.unwrap(), 0);
    assert_eq!(h.store.sold(draw.id), Some(0));
    assert_eq!(h.store.cart(user_id).await.unwrap().unwrap().items.len(), 1);

    let (orders, _) = h
        .store
        .list_for_user(user_id, &Default::default())
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_failed_second_line_unwinds_first_line() {
    let h = harness(Arc::new(SeededDraw::new(9)), CardPayments::Disabled);
    let open = competition(100, 0, vec![]);
    // 售出计数落后于票池: 预检通过, 分配失败
    let stale = competition(1, 0, vec![]);
    h.add_competition(&open);
    h.add_competition(&stale);
    h.store
        .seed_ticket(Ticket::new(stale.id, 1, Uuid::new_v4(), Uuid::new_v4(), None));
    let user_id = h.add_user(1_000, 0);
    h.set_cart(user_id, &[(&open, 2), (&stale, 1)], None);

    let err = h
        .checkout
        .complete_checkout(user_id, "site_credit")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AllocationFailed { secured: 0, .. }));
    assert!(err.is_retryable());
    assert_eq!(h.store.count_live(open.id).await.unwrap(), 0);
    assert_eq!(h.balances(user_id).await.site_credit_balance, 1_000);
}

#[tokio::test]
async fn test_cash_wallet_zero_total_with_coupon() {
    let h = harness(Arc::new(SeededDraw::new(1)), CardPayments::Disabled);
    let draw = competition(20, 0, vec![]);
    h.add_competition(&draw);
    h.add_coupon("FREEBIE", 1_000, 1);
    let user_id = h.add_user(0, 0);
    h.set_cart(user_id, &[(&draw, 2)], Some("freebie"));

    let response = h.checkout.complete_checkout(user_id, "cash").await.unwrap();

    assert_eq!(response.total, 0);
    assert_eq!(response.payment_method, PaymentMethod::Cash);
    assert_eq!(h.store.coupon_uses("FREEBIE"), Some(1));
    assert_eq!(h.balances(user_id).await.cash_balance, 0);

    let order = h.store.find(response.order_id).await.unwrap().unwrap();
    assert_eq!(order.discount, 200);
    assert_eq!(order.coupon_code.as_deref(), Some("FREEBIE"));
}

#[tokio::test]
async fn test_exhausted_coupon_is_rejected() {
    let h = harness(Arc::new(SeededDraw::new(1)), CardPayments::Disabled);
    let draw = competition(20, 0, vec![]);
    h.add_competition(&draw);
    h.add_coupon("ONCE", 50, 1);
    let first = h.add_user(1_000, 0);
    let second = h.add_user(1_000, 0);
    h.set_cart(first, &[(&draw, 1)], Some("ONCE"));
    h.set_cart(second, &[(&draw, 1)], Some("ONCE"));

    h.checkout
        .complete_checkout(first, "site_credit")
        .await
        .unwrap();
    let err = h
        .checkout
        .complete_checkout(second, "site_credit")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Checkout(CheckoutError::InvalidCoupon(code)) if code == "ONCE"
    ));
}

#[tokio::test]
async fn test_validation_errors() {
    let h = harness(Arc::new(SeededDraw::new(1)), CardPayments::Disabled);
    let draw = competition(20, 0, vec![]);
    h.add_competition(&draw);
    let user_id = h.add_user(1_000, 0);

    let err = h
        .checkout
        .complete_checkout(user_id, "site_credit")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Checkout(CheckoutError::EmptyCart)));

    h.set_cart(user_id, &[(&draw, 1)], None);
    let err = h
        .checkout
        .complete_checkout(user_id, "bitcoin")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Checkout(CheckoutError::InvalidPaymentMethod(_))
    ));

    let ghost = competition(20, 0, vec![]);
    h.set_cart(user_id, &[(&ghost, 1)], None);
    let err = h
        .checkout
        .complete_checkout(user_id, "cash")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Checkout(CheckoutError::UnknownCompetition(_))
    ));

    h.set_cart(user_id, &[(&draw, 0)], None);
    let err = h
        .checkout
        .complete_checkout(user_id, "cash")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Checkout(CheckoutError::InvalidQuantity(_))
    ));
}

#[tokio::test]
async fn test_validate_cart_reports_issues() {
    let h = harness(Arc::new(SeededDraw::new(1)), CardPayments::Disabled);
    let draw = competition(10, 8, vec![]);
    h.add_competition(&draw);
    let user_id = h.add_user(0, 0);

    h.set_cart(user_id, &[(&draw, 2)], None);
    let validation = h.checkout.validate_cart(user_id).await.unwrap();
    assert!(validation.valid);

    h.set_cart(user_id, &[(&draw, 3)], Some("NOPE"));
    let validation = h.checkout.validate_cart(user_id).await.unwrap();
    assert!(!validation.valid);
    assert_eq!(validation.issues.len(), 2);
}

#[tokio::test]
async fn test_card_checkout_requires_gateway_and_positive_total() {
    let h = harness(Arc::new(SeededDraw::new(1)), CardPayments::Disabled);
    let draw = competition(10, 0, vec![]);
    h.add_competition(&draw);
    let user_id = h.add_user(0, 0);
    h.set_cart(user_id, &[(&draw, 1)], None);

    let err = h
        .checkout
        .complete_checkout(user_id, "card")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Checkout(CheckoutError::CardPaymentsUnavailable)
    ));

    h.add_coupon("ALL", 10_000, 0);
    h.set_cart(user_id, &[(&draw, 1)], Some("ALL"));
    let err = h
        .checkout
        .complete_checkout(user_id, "card")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Checkout(CheckoutError::ZeroCardTotal)));
}

#[tokio::test]
async fn test_card_checkout_settles_once_on_capture() {
    let gateway = Arc::new(FakeGateway::default());
    let h = harness(
        Arc::new(SeededDraw::new(21)),
        CardPayments::Configured(gateway.clone()),
    );
    let draw = competition(50, 0, vec![]);
    h.add_competition(&draw);
    let user_id = h.add_user(0, 0);
    h.set_cart(user_id, &[(&draw, 2)], None);

    let response = h.checkout.complete_checkout(user_id, "card").await.unwrap();
    assert_eq!(response.payment_status, PaymentStatus::Pending);
    assert!(response.tickets.is_empty());
    assert_eq!(
        response.redirect_url.as_deref(),
        Some(format!("https://pay.test/{}", response.order_id).as_str())
    );
    {
        let jobs = gateway.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].amount, 200);
        assert_eq!(jobs[0].reference, response.order_id.to_string());
    }
    // 未支付前购物车保留
    assert_eq!(h.store.cart(user_id).await.unwrap().unwrap().items.len(), 1);

    let pending = h
        .checkout
        .confirm_card_payment(response.order_id, "processing")
        .await
        .unwrap();
    assert_eq!(pending.payment_status, PaymentStatus::Pending);

    let settled = h
        .checkout
        .confirm_card_payment(response.order_id, "captured")
        .await
        .unwrap();
    assert_eq!(settled.payment_status, PaymentStatus::Completed);
    assert_eq!(settled.tickets[0].numbers.len(), 2);

    // 重复回调不再分配
    let replay = h
        .checkout
        .confirm_card_payment(response.order_id, "captured")
        .await
        .unwrap();
    assert_eq!(replay.tickets, settled.tickets);
    let late_failure = h
        .checkout
        .confirm_card_payment(response.order_id, "declined")
        .await
        .unwrap();
    assert_eq!(late_failure.payment_status, PaymentStatus::Completed);

    assert_eq!(h.store.count_live(draw.id).await.unwrap(), 2);
    assert_eq!(h.store.sold(draw.id), Some(2));
    assert!(h.store.cart(user_id).await.unwrap().unwrap().items.is_empty());
    let stored = h.store.find(response.order_id).await.unwrap().unwrap();
    assert_eq!(
        stored.payment_job_reference,
        Some(format!("JOB-{}", response.order_id))
    );
}

#[tokio::test]
async fn test_declined_card_payment_marks_order_failed() {
    let h = harness(
        Arc::new(SeededDraw::new(2)),
        CardPayments::Configured(Arc::new(FakeGateway::default())),
    );
    let draw = competition(50, 0, vec![]);
    h.add_competition(&draw);
    let user_id = h.add_user(0, 0);
    h.set_cart(user_id, &[(&draw, 1)], None);

    let response = h.checkout.complete_checkout(user_id, "card").await.unwrap();
    let order = h
        .checkout
        .confirm_card_payment(response.order_id, "declined")
        .await
        .unwrap();

    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(h.store.count_live(draw.id).await.unwrap(), 0);

    let again = h
        .checkout
        .confirm_card_payment(response.order_id, "captured")
        .await
        .unwrap();
    assert_eq!(again.payment_status, PaymentStatus::Failed);
    assert_eq!(h.store.count_live(draw.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_captured_payment_without_tickets_fails_order() {
    let h = harness(
        Arc::new(SeededDraw::new(2)),
        CardPayments::Configured(Arc::new(FakeGateway::default())),
    );
    let draw = competition(1, 0, vec![]);
    h.add_competition(&draw);
    let user_id = h.add_user(0, 0);
    h.set_cart(user_id, &[(&draw, 1)], None);
    let response = h.checkout.complete_checkout(user_id, "card").await.unwrap();

    // 支付期间最后一张票被别人买走
    h.store
        .seed_ticket(Ticket::new(draw.id, 1, Uuid::new_v4(), Uuid::new_v4(), None));

    let order = h
        .checkout
        .confirm_card_payment(response.order_id, "captured")
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(h.store.count_live(draw.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_confirm_rejects_wallet_orders() {
    let h = harness(Arc::new(SeededDraw::new(2)), CardPayments::Disabled);
    let draw = competition(10, 0, vec![]);
    h.add_competition(&draw);
    let user_id = h.add_user(1_000, 0);
    h.set_cart(user_id, &[(&draw, 1)], None);
    let response = h
        .checkout
        .complete_checkout(user_id, "site_credit")
        .await
        .unwrap();

    let err = h
        .checkout
        .confirm_card_payment(response.order_id, "captured")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Checkout(CheckoutError::NotCardOrder(id)) if id == response.order_id
    ));

    let err = h
        .checkout
        .confirm_card_payment(Uuid::new_v4(), "captured")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_reconcile_polls_gateway_for_missing_callback() {
    let gateway = Arc::new(FakeGateway::default());
    let h = harness(
        Arc::new(SeededDraw::new(5)),
        CardPayments::Configured(gateway.clone()),
    );
    let draw = competition(20, 0, vec![]);
    h.add_competition(&draw);
    let user_id = h.add_user(0, 0);
    h.set_cart(user_id, &[(&draw, 2)], None);
    let response = h.checkout.complete_checkout(user_id, "card").await.unwrap();
    let job_reference = format!("JOB-{}", response.order_id);

    gateway.report("processing");
    let order = h
        .checkout
        .reconcile_card_order(response.order_id)
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    gateway.report("captured");
    let order = h
        .checkout
        .reconcile_card_order(response.order_id)
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.tickets[0].numbers.len(), 2);
    assert_eq!(h.store.sold(draw.id), Some(2));

    // 已完成的订单不再查询网关
    let order = h
        .checkout
        .reconcile_card_order(response.order_id)
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(
        *gateway.polls.lock().unwrap(),
        vec![job_reference.clone(), job_reference]
    );
}

#[tokio::test]
async fn test_reconcile_marks_declined_job_failed() {
    let gateway = Arc::new(FakeGateway::default());
    let h = harness(
        Arc::new(SeededDraw::new(5)),
        CardPayments::Configured(gateway.clone()),
    );
    let draw = competition(20, 0, vec![]);
    h.add_competition(&draw);
    let user_id = h.add_user(0, 0);
    h.set_cart(user_id, &[(&draw, 1)], None);
    let response = h.checkout.complete_checkout(user_id, "card").await.unwrap();

    gateway.report("declined");
    let order = h
        .checkout
        .reconcile_card_order(response.order_id)
        .await
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(h.store.count_live(draw.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reconcile_rejects_wallet_orders() {
    let h = harness(Arc::new(SeededDraw::new(2)), CardPayments::Disabled);
    let draw = competition(10, 0, vec![]);
    h.add_competition(&draw);
    let user_id = h.add_user(1_000, 0);
    h.set_cart(user_id, &[(&draw, 1)], None);
    let response = h
        .checkout
        .complete_checkout(user_id, "site_credit")
        .await
        .unwrap();

    let err = h
        .checkout
        .reconcile_card_order(response.order_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Checkout(CheckoutError::NotCardOrder(_))
    ));
}

#[tokio::test]
async fn test_oversized_cart_total_is_rejected() {
    let h = harness(Arc::new(SeededDraw::new(2)), CardPayments::Disabled);
    let mut draw = competition(100, 0, vec![]);
    draw.price = i64::MAX / 2;
    h.add_competition(&draw);
    let user_id = h.add_user(1_000, 0);
    h.set_cart(user_id, &[(&draw, 3)], None);

    let err = h
        .checkout
        .complete_checkout(user_id, "site_credit")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Checkout(CheckoutError::AmountOverflow)
    ));
    assert_eq!(h.store.count_live(draw.id).await.unwrap(), 0);
}
