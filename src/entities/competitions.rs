use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// 比赛实体
/// - max_tickets: 票号上限, 票号范围为 [1, max_tickets]
/// - tickets_sold: 已完成订单售出的票数, 只增不减
/// - instant_wins: 即开奖配置 (JSON 数组, 按顺序匹配)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "competitions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    pub price: i64,
    pub max_tickets: i64,
    pub tickets_sold: i64,
    pub instant_wins: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
