pub mod config;
pub mod coordinator;
pub mod errors;
pub mod executor;
pub mod rate_limiter;

// Re-export key types
pub use config::BulkConfig;
pub use coordinator::{poll_job_statuses, BulkOperationCoordinator, BulkOperationHandle, ServerDirectory};
pub use errors::{BulkError, UnitError};
pub use executor::{ConcurrentExecutor, UnitOutcome};
pub use rate_limiter::RateLimiter;
