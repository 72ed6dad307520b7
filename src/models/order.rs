use crate::entities::{PaymentMethod, PaymentStatus, order_entity};
use crate::error::AppError;
use crate::models::CartLine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Winning tickets of one competition grouped under the prize they matched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct InstantWinGroup {
    pub prize: String,
    pub ticket_numbers: Vec<i64>,
}

/// Ticket summary of one order line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CompetitionTickets {
    pub competition_id: Uuid,
    pub title: String,
    pub numbers: Vec<i64>,
    pub instant_wins: Vec<InstantWinGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub order_number: i64,
    pub user_id: Uuid,
    pub total: i64,
    pub discount: i64,
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub lines: Vec<CartLine>,
    pub tickets: Vec<CompetitionTickets>,
    pub ticket_count: i32,
    pub payment_job_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// A fresh `pending` order with no tickets allocated yet.
    pub fn pending(
        order_number: i64,
        user_id: Uuid,
        total: i64,
        discount: i64,
        coupon_code: Option<String>,
        payment_method: PaymentMethod,
        lines: Vec<CartLine>,
    ) -> Self {
        let ticket_count = lines.iter().map(|l| l.quantity as i32).sum();
        Self {
            id: Uuid::new_v4(),
            order_number,
            user_id,
            total,
            discount,
            coupon_code,
            payment_method,
            payment_status: PaymentStatus::Pending,
            lines,
            tickets: Vec::new(),
            ticket_count,
            payment_job_reference: None,
            created_at: Utc::now(),
        }
    }
}

impl TryFrom<order_entity::Model> for Order {
    type Error = AppError;

    fn try_from(m: order_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            order_number: m.order_number,
            user_id: m.user_id,
            total: m.total,
            discount: m.discount,
            coupon_code: m.coupon_code,
            payment_method: m.payment_method,
            payment_status: m.payment_status,
            lines: serde_json::from_value(m.lines)?,
            tickets: serde_json::from_value(m.tickets)?,
            ticket_count: m.ticket_count,
            payment_job_reference: m.payment_job_reference,
            created_at: m.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// site_credit, cash or card
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub tickets: Vec<CompetitionTickets>,
    pub total: i64,
    /// Set for card orders: where to send the customer to pay.
    pub redirect_url: Option<String>,
}

impl CheckoutResponse {
    pub fn from_order(order: &Order, redirect_url: Option<String>) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            tickets: order.tickets.clone(),
            total: order.total,
            redirect_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutValidation {
    pub valid: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}
