pub mod allocation_service;
pub mod checkout_service;
pub mod instant_win;
pub mod order_service;
pub mod wallet_service;

pub use allocation_service::*;
pub use checkout_service::*;
pub use order_service::*;
pub use wallet_service::*;
