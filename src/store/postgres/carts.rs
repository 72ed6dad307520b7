use super::PgStore;
use crate::entities::cart_entity as carts;
use crate::error::AppResult;
use crate::models::Cart;
use crate::store::CartRepository;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use uuid::Uuid;

#[async_trait]
impl CartRepository for PgStore {
    async fn cart(&self, user_id: Uuid) -> AppResult<Option<Cart>> {
        carts::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .map(Cart::try_from)
            .transpose()
    }

    async fn clear(&self, user_id: Uuid) -> AppResult<()> {
        carts::Entity::update_many()
            .col_expr(carts::Column::Items, Expr::value(json!([])))
            .col_expr(carts::Column::CouponCode, Expr::value(Option::<String>::None))
            .col_expr(carts::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(carts::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}
