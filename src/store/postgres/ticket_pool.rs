use super::PgStore;
use crate::entities::ticket_entity as tickets;
use crate::error::AppResult;
use crate::models::Ticket;
use crate::store::{ClaimOutcome, TicketPool};
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

#[async_trait]
impl TicketPool for PgStore {
    async fn claim(&self, ticket: &Ticket) -> AppResult<ClaimOutcome> {
        // 唯一索引 (competition_id, ticket_number) 保证同一票号只会插入一次
        let inserted = tickets::Entity::insert(tickets::ActiveModel::from(ticket))
            .on_conflict(
                OnConflict::columns([tickets::Column::CompetitionId, tickets::Column::TicketNumber])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(if inserted == 1 {
            ClaimOutcome::Claimed
        } else {
            ClaimOutcome::AlreadyTaken
        })
    }

    async fn release(
        &self,
        competition_id: Uuid,
        ticket_number: i64,
        order_id: Uuid,
    ) -> AppResult<()> {
        tickets::Entity::delete_many()
            .filter(tickets::Column::CompetitionId.eq(competition_id))
            .filter(tickets::Column::TicketNumber.eq(ticket_number))
            .filter(tickets::Column::OrderId.eq(order_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn count_live(&self, competition_id: Uuid) -> AppResult<u64> {
        let count = tickets::Entity::find()
            .filter(tickets::Column::CompetitionId.eq(competition_id))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    async fn tickets_for_order(&self, order_id: Uuid) -> AppResult<Vec<Ticket>> {
        let rows = tickets::Entity::find()
            .filter(tickets::Column::OrderId.eq(order_id))
            .order_by_asc(tickets::Column::CompetitionId)
            .order_by_asc(tickets::Column::TicketNumber)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Ticket::from).collect())
    }
}
