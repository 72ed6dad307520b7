pub mod carts;
pub mod competitions;
pub mod counters;
pub mod coupons;
pub mod enums;
pub mod orders;
pub mod tickets;
pub mod users;
pub mod wallet_ledger_entries;

pub use carts as cart_entity;
pub use competitions as competition_entity;
pub use counters as counter_entity;
pub use coupons as coupon_entity;
pub use enums::*;
pub use orders as order_entity;
pub use tickets as ticket_entity;
pub use users as user_entity;
pub use wallet_ledger_entries as wallet_ledger_entry_entity;
