pub mod cart;
pub mod competition;
pub mod order;
pub mod pagination;
pub mod ticket;
pub mod wallet;

pub use cart::*;
pub use competition::*;
pub use order::*;
pub use pagination::*;
pub use ticket::*;
pub use wallet::*;
