use crate::entities::{PaymentMethod, PaymentStatus};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_number: i64,
    pub user_id: Uuid,
    pub total: i64,
    pub discount: i64,
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// 下单时购物车快照 (卡支付回调后据此分配票号)
    pub lines: Json,
    /// 票号汇总 (按比赛分组, 含即开奖)
    pub tickets: Json,
    pub ticket_count: i32,
    pub payment_job_reference: Option<String>,
    /// 非空表示已有流程在结算该订单
    pub settlement_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
