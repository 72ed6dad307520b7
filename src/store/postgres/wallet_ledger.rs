use super::PgStore;
use crate::entities::{
    LedgerEntryKind, WalletType, user_entity as users, wallet_ledger_entry_entity as ledger,
};
use crate::error::{AppError, AppResult};
use crate::models::{LedgerOutcome, LedgerReason, WalletBalances};
use crate::store::WalletLedger;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use uuid::Uuid;

fn balance_column(wallet: WalletType) -> users::Column {
    match wallet {
        WalletType::SiteCredit => users::Column::SiteCreditBalance,
        WalletType::Cash => users::Column::CashBalance,
    }
}

impl PgStore {
    /// Writes the ledger row and moves the balance by `delta` in one transaction.
    ///
    /// The unique key (reason_kind, reason_id, entry_kind) turns a replay into a
    /// no-op; a negative `delta` only applies while the balance still covers it.
    async fn apply_entry(
        &self,
        user_id: Uuid,
        wallet: WalletType,
        delta: i64,
        entry_kind: LedgerEntryKind,
        reason: LedgerReason,
    ) -> AppResult<LedgerOutcome> {
        let txn = self.db.begin().await?;

        let inserted = ledger::Entity::insert(ledger::ActiveModel {
            user_id: Set(user_id),
            wallet_type: Set(wallet),
            amount: Set(delta),
            entry_kind: Set(entry_kind),
            reason_kind: Set(reason.kind()),
            reason_id: Set(reason.id()),
            created_at: Set(Utc::now()),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                ledger::Column::ReasonKind,
                ledger::Column::ReasonId,
                ledger::Column::EntryKind,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        if inserted == 0 {
            txn.rollback().await?;
            return Ok(LedgerOutcome::Duplicate);
        }

        let column = balance_column(wallet);
        let mut update = users::Entity::update_many()
            .col_expr(column, Expr::col(column).add(delta))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(users::Column::Id.eq(user_id));
        if delta < 0 {
            update = update.filter(column.gte(-delta));
        }
        let result = update.exec(&txn).await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            let exists = users::Entity::find_by_id(user_id)
                .one(&self.db)
                .await?
                .is_some();
            return Err(if exists {
                AppError::InsufficientFunds { wallet }
            } else {
                AppError::NotFound("User not found".into())
            });
        }

        txn.commit().await?;
        Ok(LedgerOutcome::Applied)
    }
}

#[async_trait]
impl WalletLedger for PgStore {
    async fn credit(
        &self,
        user_id: Uuid,
        wallet: WalletType,
        amount: i64,
        reason: LedgerReason,
    ) -> AppResult<LedgerOutcome> {
        if amount < 0 {
            return Err(AppError::ValidationError("Negative credit".into()));
        }
        self.apply_entry(user_id, wallet, amount, LedgerEntryKind::Credit, reason)
            .await
    }

    async fn debit(
        &self,
        user_id: Uuid,
        wallet: WalletType,
        amount: i64,
        reason: LedgerReason,
    ) -> AppResult<LedgerOutcome> {
        if amount < 0 {
            return Err(AppError::ValidationError("Negative debit".into()));
        }
        self.apply_entry(user_id, wallet, -amount, LedgerEntryKind::Debit, reason)
            .await
    }

    async fn reverse(&self, reason: LedgerReason) -> AppResult<LedgerOutcome> {
        // 流水写入后不可修改, 可在事务外读取原始记录
        let original = ledger::Entity::find()
            .filter(ledger::Column::ReasonKind.eq(reason.kind()))
            .filter(ledger::Column::ReasonId.eq(reason.id()))
            .filter(
                ledger::Column::EntryKind.is_in([LedgerEntryKind::Credit, LedgerEntryKind::Debit]),
            )
            .one(&self.db)
            .await?;

        let Some(original) = original else {
            return Ok(LedgerOutcome::NothingToReverse);
        };

        self.apply_entry(
            original.user_id,
            original.wallet_type,
            -original.amount,
            LedgerEntryKind::Reversal,
            reason,
        )
        .await
    }

    async fn balances(&self, user_id: Uuid) -> AppResult<Option<WalletBalances>> {
        let user = users::Entity::find_by_id(user_id).one(&self.db).await?;
        Ok(user.map(WalletBalances::from))
    }
}
