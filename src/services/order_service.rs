use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::store::OrderRepository;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    /// 用户订单列表, 按下单时间倒序
    pub async fn get_user_orders(
        &self,
        user_id: Uuid,
        query: &OrderQuery,
    ) -> AppResult<PaginatedResponse<Order>> {
        let params = PaginationParams::new(query.page, query.per_page);
        let (items, total) = self.orders.list_for_user(user_id, &params).await?;
        Ok(PaginatedResponse::new(items, &params, total))
    }

    /// Other users' orders are reported as missing.
    pub async fn get_user_order(&self, user_id: Uuid, order_id: Uuid) -> AppResult<Order> {
        self.orders
            .find(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Order not found".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PaymentMethod;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_orders_are_scoped_to_owner() {
        let store = Arc::new(MemoryStore::new(1000));
        let service = OrderService::new(store.clone());
        let owner = Uuid::new_v4();
        let order = Order::pending(1000, owner, 500, 0, None, PaymentMethod::Cash, vec![]);
        store.insert(&order).await.unwrap();

        assert_eq!(service.get_user_order(owner, order.id).await.unwrap().id, order.id);
        assert!(matches!(
            service.get_user_order(Uuid::new_v4(), order.id).await,
            Err(AppError::NotFound(_))
        ));

        let page = service
            .get_user_orders(
                owner,
                &OrderQuery {
                    page: None,
                    per_page: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].order_number, 1000);
    }
}
