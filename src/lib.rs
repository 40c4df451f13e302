pub mod allocator;
pub mod config;
pub mod error;
pub mod service;

pub use allocator::StoreAllocator;
pub use config::{BackendConfig, ChangeBasketConfig, CONFIG_FILE};
pub use error::{BackendError, Result};
pub use service::{Balance, FundedTransaction, FundingRequest, FundingService};
