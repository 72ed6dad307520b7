use crate::entities::{LedgerEntryKind, LedgerReasonKind, WalletType};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// 钱包流水
/// amount 为有符号数: 入账为正, 扣款/冲正为负 (冲正 credit) 或正 (冲正 debit)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "wallet_ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: Uuid,
    pub wallet_type: WalletType,
    pub amount: i64,
    pub entry_kind: LedgerEntryKind,
    pub reason_kind: LedgerReasonKind,
    pub reason_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
