//! Error taxonomy for resolution and reconciliation.

use std::fmt;
use std::time::Duration;

use rollcall_auth::ProviderError;
use rollcall_storage::StoreError;

/// Failure kinds surfaced to callers.
///
/// A principal that does not exist is not an error; see
/// [`Resolution::NotFound`](crate::resolver::Resolution::NotFound).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No accepted bearer credential could be obtained.
    AuthFailure,
    /// The provider timed out, failed, or sent a malformed body.
    ProviderUnavailable,
    /// The membership store failed.
    StoreUnavailable,
    /// The request was rejected before any I/O.
    InvalidInput,
    /// A reconciliation run exceeded its time budget.
    TimedOut,
    /// A reconciliation run is already in progress.
    Busy,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AuthFailure => "auth_failure",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::StoreUnavailable => "store_unavailable",
            Self::InvalidInput => "invalid_input",
            Self::TimedOut => "timed_out",
            Self::Busy => "busy",
        };
        f.write_str(s)
    }
}

/// Errors from a single group resolution.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Store call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Failure kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(e) if e.is_auth_failure() => ErrorKind::AuthFailure,
            Self::Provider(_) => ErrorKind::ProviderUnavailable,
            Self::Store(e) if e.is_invalid_input() => ErrorKind::InvalidInput,
            Self::Store(_) => ErrorKind::StoreUnavailable,
        }
    }

    /// Returns `true` if no provider credential could be obtained.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        self.kind() == ErrorKind::AuthFailure
    }

    /// Returns `true` if the provider was unavailable.
    #[must_use]
    pub fn is_provider_unavailable(&self) -> bool {
        self.kind() == ErrorKind::ProviderUnavailable
    }

    /// Returns `true` if the store was unavailable.
    #[must_use]
    pub fn is_store_unavailable(&self) -> bool {
        self.kind() == ErrorKind::StoreUnavailable
    }
}

/// Errors from a reconciliation run.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The roster could not be fetched. Nothing was written.
    #[error("Roster fetch failed: {0}")]
    Fetch(#[source] ProviderError),

    /// An upsert failed and the run was aborted.
    #[error("Upsert failed for principal '{principal}': {source}")]
    Upsert {
        principal: String,
        #[source]
        source: StoreError,
    },

    /// The run did not finish within its time budget.
    #[error("Reconciliation exceeded {}", format_limit(.limit))]
    TimedOut { limit: Duration },

    /// Another run holds the reconciliation lock.
    #[error("Reconciliation already running")]
    AlreadyRunning,

    /// The cron expression does not parse.
    #[error("Invalid schedule '{expression}': {message}")]
    InvalidSchedule { expression: String, message: String },
}

fn format_limit(limit: &Duration) -> String {
    humantime_serde::re::humantime::format_duration(*limit).to_string()
}

impl ReconcileError {
    /// Failure kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch(e) if e.is_auth_failure() => ErrorKind::AuthFailure,
            Self::Fetch(_) => ErrorKind::ProviderUnavailable,
            Self::Upsert { source, .. } if source.is_invalid_input() => ErrorKind::InvalidInput,
            Self::Upsert { .. } => ErrorKind::StoreUnavailable,
            Self::TimedOut { .. } => ErrorKind::TimedOut,
            Self::AlreadyRunning => ErrorKind::Busy,
            Self::InvalidSchedule { .. } => ErrorKind::InvalidInput,
        }
    }

    /// Returns `true` if the run was abandoned before any write.
    #[must_use]
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}
