pub mod engine;

pub use engine::{BuyReceipt, CancelReceipt, NftReturn, SettlementEngine};
