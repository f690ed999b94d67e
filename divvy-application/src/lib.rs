#![warn(clippy::uninlined_format_args)]

pub mod error;
pub mod model;
pub mod optimizer;
pub mod ports;
pub mod settlement_service;

pub use error::ApplicationError;
pub use model::{GroupLedger, GroupOverview};
pub use optimizer::GreedyOptimizer;
pub use ports::SettlementOptimizer;
pub use settlement_service::SettlementService;
