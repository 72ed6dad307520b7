use super::PgStore;
use crate::entities::{competition_entity as competitions, coupon_entity as coupons};
use crate::error::{AppError, AppResult};
use crate::models::{Competition, Coupon};
use crate::store::Catalog;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{BinOper, Expr};
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter};
use uuid::Uuid;

#[async_trait]
impl Catalog for PgStore {
    async fn competition(&self, id: Uuid) -> AppResult<Option<Competition>> {
        competitions::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Competition::try_from)
            .transpose()
    }

    async fn record_sale(&self, competition_id: Uuid, quantity: i64) -> AppResult<()> {
        let result = competitions::Entity::update_many()
            .col_expr(
                competitions::Column::TicketsSold,
                Expr::col(competitions::Column::TicketsSold).add(quantity),
            )
            .col_expr(competitions::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(competitions::Column::Id.eq(competition_id))
            .filter(
                Expr::col(competitions::Column::TicketsSold)
                    .add(quantity)
                    .binary(
                        BinOper::SmallerThanOrEqual,
                        Expr::col(competitions::Column::MaxTickets),
                    ),
            )
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::InternalError(format!(
                "tickets_sold of {competition_id} would exceed max_tickets"
            )));
        }
        Ok(())
    }

    async fn coupon(&self, code: &str) -> AppResult<Option<Coupon>> {
        let coupon = coupons::Entity::find()
            .filter(coupons::Column::Code.eq(code.trim().to_uppercase()))
            .one(&self.db)
            .await?;
        Ok(coupon.map(Coupon::from))
    }

    async fn redeem_coupon(&self, code: &str) -> AppResult<bool> {
        // 条件更新: 仍然有效且未达到使用上限时才计数
        let result = coupons::Entity::update_many()
            .col_expr(
                coupons::Column::TimesUsed,
                Expr::col(coupons::Column::TimesUsed).add(1),
            )
            .filter(coupons::Column::Code.eq(code.trim().to_uppercase()))
            .filter(coupons::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(coupons::Column::MaxUses.eq(0))
                    .add(Expr::col(coupons::Column::TimesUsed).lt(Expr::col(coupons::Column::MaxUses))),
            )
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }
}
