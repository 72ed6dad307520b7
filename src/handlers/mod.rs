pub mod checkout;
pub mod order;
pub mod wallet;
pub mod webhook;

pub use checkout::checkout_config;
pub use order::order_config;
pub use wallet::wallet_config;
pub use webhook::webhook_config;
