//! Wallet Payment Allocator and Wallet Alert Pipeline.

pub mod alert;
pub mod allocator;
pub mod credit_grant;

pub use alert::{WalletAlertPipeline, WalletBalanceRecomputeService, DEFAULT_THROTTLE_WINDOW_SECONDS};
pub use allocator::{AllocationStrategy, PayOptions, PaymentOutcome, WalletPaymentAllocator, WalletRepository};
pub use credit_grant::{CreditGrantMaterializer, GrantMaterialization, WalletTopUpRepository};
