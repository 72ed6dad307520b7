use super::PgStore;
use crate::entities::{PaymentStatus, order_entity as orders};
use crate::error::{AppError, AppResult};
use crate::models::{CompetitionTickets, Order, PaginationParams};
use crate::store::OrderRepository;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

/// Which orders a terminal transition may touch, by settlement ownership.
#[derive(Debug, Clone, Copy)]
enum SettlementGuard {
    Any,
    Started,
    NotStarted,
}

impl PgStore {
    /// Moves a `pending` order to `status`; `Ok(false)` when it had already left `pending`
    /// or the settlement guard did not match.
    async fn finish_order(
        &self,
        id: Uuid,
        status: PaymentStatus,
        tickets: Option<&[CompetitionTickets]>,
        guard: SettlementGuard,
    ) -> AppResult<bool> {
        let mut update = orders::Entity::update_many()
            .col_expr(orders::Column::PaymentStatus, Expr::value(status))
            .col_expr(orders::Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(tickets) = tickets {
            update = update.col_expr(
                orders::Column::Tickets,
                Expr::value(serde_json::to_value(tickets)?),
            );
        }
        update = update
            .filter(orders::Column::Id.eq(id))
            .filter(orders::Column::PaymentStatus.eq(PaymentStatus::Pending));
        update = match guard {
            SettlementGuard::Any => update,
            SettlementGuard::Started => {
                update.filter(orders::Column::SettlementStartedAt.is_not_null())
            }
            SettlementGuard::NotStarted => {
                update.filter(orders::Column::SettlementStartedAt.is_null())
            }
        };
        let result = update.exec(&self.db).await?;

        if result.rows_affected == 1 {
            return Ok(true);
        }
        self.require_order(id).await?;
        Ok(false)
    }

    async fn require_order(&self, id: Uuid) -> AppResult<()> {
        orders::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Order not found".into()))
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert(&self, order: &Order) -> AppResult<()> {
        let now = Utc::now();
        orders::Entity::insert(orders::ActiveModel {
            id: Set(order.id),
            order_number: Set(order.order_number),
            user_id: Set(order.user_id),
            total: Set(order.total),
            discount: Set(order.discount),
            coupon_code: Set(order.coupon_code.clone()),
            payment_method: Set(order.payment_method),
            payment_status: Set(order.payment_status),
            lines: Set(serde_json::to_value(&order.lines)?),
            tickets: Set(serde_json::to_value(&order.tickets)?),
            ticket_count: Set(order.ticket_count),
            payment_job_reference: Set(order.payment_job_reference.clone()),
            settlement_started_at: Set(None),
            created_at: Set(order.created_at),
            updated_at: Set(now),
        })
        .exec_without_returning(&self.db)
        .await?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Order>> {
        orders::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        params: &PaginationParams,
    ) -> AppResult<(Vec<Order>, u64)> {
        let query = orders::Entity::find()
            .filter(orders::Column::UserId.eq(user_id))
            .order_by_desc(orders::Column::CreatedAt);

        let total = query.clone().count(&self.db).await?;
        let rows = query
            .offset(params.get_offset())
            .limit(params.get_limit())
            .all(&self.db)
            .await?;

        let items = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((items, total))
    }

    async fn attach_payment_job(&self, id: Uuid, job_reference: &str) -> AppResult<()> {
        let result = orders::Entity::update_many()
            .col_expr(
                orders::Column::PaymentJobReference,
                Expr::value(job_reference.to_string()),
            )
            .col_expr(orders::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(orders::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound("Order not found".into()));
        }
        Ok(())
    }

    async fn begin_settlement(&self, id: Uuid) -> AppResult<bool> {
        let result = orders::Entity::update_many()
            .col_expr(orders::Column::SettlementStartedAt, Expr::value(Utc::now()))
            .filter(orders::Column::Id.eq(id))
            .filter(orders::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(orders::Column::SettlementStartedAt.is_null())
            .exec(&self.db)
            .await?;

        if result.rows_affected == 1 {
            return Ok(true);
        }
        self.require_order(id).await?;
        Ok(false)
    }

    async fn complete(&self, id: Uuid, tickets: &[CompetitionTickets]) -> AppResult<bool> {
        self.finish_order(
            id,
            PaymentStatus::Completed,
            Some(tickets),
            SettlementGuard::Any,
        )
        .await
    }

    async fn fail(&self, id: Uuid) -> AppResult<bool> {
        self.finish_order(id, PaymentStatus::Failed, None, SettlementGuard::NotStarted)
            .await
    }

    async fn fail_settlement(&self, id: Uuid) -> AppResult<bool> {
        self.finish_order(id, PaymentStatus::Failed, None, SettlementGuard::Started)
            .await
    }
}
