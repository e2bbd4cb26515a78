pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod reconcile;
pub mod resolver;
pub mod server;
pub mod signature;

#[cfg(test)]
mod test_support;

pub use config::{AppConfig, LoggingConfig, ReconcileConfig, ServerConfig, StorageBackend, StorageConfig};
pub use error::{ErrorKind, ReconcileError, SyncError};
pub use observability::init_tracing;
pub use reconcile::{
    ReconcileReport, ReconcileStats, Reconciler, ReconciliationScheduler, UpsertFailure,
    UpsertFailurePolicy,
};
pub use resolver::{GroupResolver, Resolution};
pub use server::{AppState, RollcallServer, ServerBuilder, build_app};
pub use signature::{RequestVerifier, SignatureError};
