use crate::entities::WalletType;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "tickets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub competition_id: Uuid,
    pub ticket_number: i64,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub is_instant_win: bool,
    pub win_label: Option<String>,
    pub win_amount: i64,
    pub wallet_type: Option<WalletType>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
