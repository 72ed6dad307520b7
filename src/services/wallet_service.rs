use crate::error::{AppError, AppResult};
use crate::models::WalletBalances;
use crate::store::WalletLedger;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct WalletService {
    ledger: Arc<dyn WalletLedger>,
}

impl WalletService {
    pub fn new(ledger: Arc<dyn WalletLedger>) -> Self {
        Self { ledger }
    }

    pub async fn get_balances(&self, user_id: Uuid) -> AppResult<WalletBalances> {
        self.ledger
            .balances(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }
}
