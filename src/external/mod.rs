pub mod cashflows;

pub use cashflows::*;
