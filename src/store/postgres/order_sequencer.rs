use super::PgStore;
use crate::entities::counter_entity as counters;
use crate::error::{AppError, AppResult};
use crate::store::OrderSequencer;
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, Set, Statement};

const ORDER_COUNTER: &str = "order_number";

/// Creates the counter so that the first `next()` returns `start`. An existing counter is left alone.
pub(super) async fn ensure_counter(db: &DatabaseConnection, start: i64) -> AppResult<()> {
    counters::Entity::insert(counters::ActiveModel {
        name: Set(ORDER_COUNTER.to_string()),
        value: Set(start - 1),
    })
    .on_conflict(
        OnConflict::column(counters::Column::Name)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(db)
    .await?;
    Ok(())
}

#[async_trait]
impl OrderSequencer for PgStore {
    async fn next(&self) -> AppResult<i64> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                "UPDATE counters SET value = value + 1 WHERE name = $1 RETURNING value",
                [ORDER_COUNTER.into()],
            ))
            .await?
            .ok_or_else(|| AppError::InternalError("Order number counter missing".into()))?;
        Ok(row.try_get::<i64>("", "value")?)
    }
}
