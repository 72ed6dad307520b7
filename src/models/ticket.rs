use crate::entities::ticket_entity;
use crate::models::WinResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Ticket {
    pub id: Uuid,
    pub competition_id: Uuid,
    pub ticket_number: i64,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub win: Option<WinResult>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(
        competition_id: Uuid,
        ticket_number: i64,
        order_id: Uuid,
        user_id: Uuid,
        win: Option<WinResult>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            competition_id,
            ticket_number,
            order_id,
            user_id,
            win,
            created_at: Utc::now(),
        }
    }

    pub fn is_instant_win(&self) -> bool {
        self.win.is_some()
    }

    /// A win that moves money; zero-amount prizes are recorded but never credited.
    pub fn payable_win(&self) -> Option<&WinResult> {
        self.win.as_ref().filter(|w| w.amount > 0)
    }
}

impl From<ticket_entity::Model> for Ticket {
    fn from(m: ticket_entity::Model) -> Self {
        let win = if m.is_instant_win {
            Some(WinResult {
                label: m.win_label.unwrap_or_default(),
                amount: m.win_amount,
                wallet_type: m.wallet_type.unwrap_or_default(),
            })
        } else {
            None
        };
        Self {
            id: m.id,
            competition_id: m.competition_id,
            ticket_number: m.ticket_number,
            order_id: m.order_id,
            user_id: m.user_id,
            win,
            created_at: m.created_at,
        }
    }
}

impl From<&Ticket> for ticket_entity::ActiveModel {
    fn from(t: &Ticket) -> Self {
        use sea_orm::Set;
        ticket_entity::ActiveModel {
            id: Set(t.id),
            competition_id: Set(t.competition_id),
            ticket_number: Set(t.ticket_number),
            order_id: Set(t.order_id),
            user_id: Set(t.user_id),
            is_instant_win: Set(t.is_instant_win()),
            win_label: Set(t.win.as_ref().map(|w| w.label.clone())),
            win_amount: Set(t.win.as_ref().map(|w| w.amount).unwrap_or(0)),
            wallet_type: Set(t.win.as_ref().map(|w| w.wallet_type)),
            created_at: Set(t.created_at),
        }
    }
}
