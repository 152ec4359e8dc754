pub mod api;
pub mod errors;
pub mod http;
pub mod inventory;
pub mod reconcile;

// Re-export key types
pub use api::{InstanceDescriber, JobHandle, LaunchConfigurationUpdate, ListFilter, MgnApi};
pub use errors::{ClientError, ReconcileError};
pub use http::{HttpInstanceDescriber, HttpMgnClient};
pub use inventory::ServerInventory;
pub use reconcile::StatusReconciler;
