//! sea-orm backed stores.
//!
//! All six traits are implemented on one `PgStore` so a single connection pool
//! serves every seam; each impl lives in its own file.

mod carts;
mod catalog;
mod order_sequencer;
mod orders;
mod ticket_pool;
mod wallet_ledger;

use super::Stores;
use crate::error::AppResult;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct PgStore {
    db: DatabaseConnection,
}

impl PgStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl Stores {
    /// Wires every seam to Postgres and seeds the order number counter if it is new.
    pub async fn postgres(db: DatabaseConnection, order_number_start: i64) -> AppResult<Self> {
        order_sequencer::ensure_counter(&db, order_number_start).await?;
        let store = Arc::new(PgStore::new(db));
        Ok(Self {
            tickets: store.clone(),
            ledger: store.clone(),
            sequencer: store.clone(),
            catalog: store.clone(),
            orders: store.clone(),
            carts: store,
        })
    }
}
