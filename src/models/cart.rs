use crate::entities::{cart_entity, coupon_entity};
use crate::error::{AppError, CheckoutError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// One line of a cart as the cart service hands it over at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CartLine {
    pub competition_id: Uuid,
    pub title: String,
    /// 单价 (便士)
    #[serde(alias = "price")]
    pub unit_price: i64,
    pub quantity: u32,
}

impl CartLine {
    /// `None` when the line total does not fit in an `i64`.
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Cart {
    pub user_id: Uuid,
    pub items: Vec<CartLine>,
    pub coupon_code: Option<String>,
}

impl Cart {
    pub fn subtotal(&self) -> Result<i64, CheckoutError> {
        self.items.iter().try_fold(0i64, |acc, line| {
            line.line_total()
                .and_then(|t| acc.checked_add(t))
                .ok_or(CheckoutError::AmountOverflow)
        })
    }
}

impl TryFrom<cart_entity::Model> for Cart {
    type Error = AppError;

    fn try_from(m: cart_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: m.user_id,
            items: serde_json::from_value(m.items)?,
            coupon_code: m.coupon_code.filter(|c| !c.is_empty()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Coupon {
    pub code: String,
    pub discount_amount: i64,
    pub is_active: bool,
    /// 0 = unlimited
    pub max_uses: i32,
    pub times_used: i32,
}

impl Coupon {
    pub fn is_redeemable(&self) -> bool {
        self.is_active && (self.max_uses == 0 || self.times_used < self.max_uses)
    }
}

impl From<coupon_entity::Model> for Coupon {
    fn from(m: coupon_entity::Model) -> Self {
        Self {
            code: m.code,
            discount_amount: m.discount_amount,
            is_active: m.is_active,
            max_uses: m.max_uses,
            times_used: m.times_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_subtotal() {
        let cart = Cart {
            user_id: Uuid::new_v4(),
            items: vec![
                CartLine {
                    competition_id: Uuid::new_v4(),
                    title: "Car".into(),
                    unit_price: 250,
                    quantity: 4,
                },
                CartLine {
                    competition_id: Uuid::new_v4(),
                    title: "Cash".into(),
                    unit_price: 99,
                    quantity: 1,
                },
            ],
            coupon_code: None,
        };
        assert_eq!(cart.subtotal(), Ok(1099));
    }

    #[test]
    fn test_cart_subtotal_overflow() {
        let line = |unit_price: i64, quantity: u32| CartLine {
            competition_id: Uuid::new_v4(),
            title: "Big".into(),
            unit_price,
            quantity,
        };
        let cart = Cart {
            user_id: Uuid::new_v4(),
            items: vec![line(i64::MAX / 2, 3)],
            coupon_code: None,
        };
        assert_eq!(cart.subtotal(), Err(CheckoutError::AmountOverflow));

        let cart = Cart {
            user_id: Uuid::new_v4(),
            items: vec![line(i64::MAX / 2, 1), line(i64::MAX / 2, 1), line(2, 1)],
            coupon_code: None,
        };
        assert_eq!(cart.subtotal(), Err(CheckoutError::AmountOverflow));
    }

    #[test]
    fn test_coupon_redeemable() {
        let mut coupon = Coupon {
            code: "SPRING".into(),
            discount_amount: 100,
            is_active: true,
            max_uses: 2,
            times_used: 1,
        };
        assert!(coupon.is_redeemable());
        coupon.times_used = 2;
        assert!(!coupon.is_redeemable());
        coupon.max_uses = 0;
        assert!(coupon.is_redeemable());
        coupon.is_active = false;
        assert!(!coupon.is_redeemable());
    }
}
