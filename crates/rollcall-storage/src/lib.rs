//! # rollcall-storage
//!
//! Membership store abstraction for rollcall.
//!
//! A membership store maps a principal identifier (a username) to the set of
//! groups that principal belongs to. It is the local, persistent side of the
//! read-through cache: lookups hit the store first, and both the resolver and
//! the reconciliation job write provider data back into it.
//!
//! ## Overview
//!
//! - [`MembershipStore`] - point lookup and atomic per-key upsert
//! - [`GroupSet`] - an unordered, deduplicated set of group names
//! - [`MembershipEntry`] - a stored row with its `updated_at` timestamp
//! - [`InMemoryMembershipStore`] - concurrent in-process backend
//!
//! The PostgreSQL backend lives in `rollcall-postgres`.
//!
//! ## Example
//!
//! ```ignore
//! use rollcall_storage::{GroupSet, InMemoryMembershipStore, MembershipStore};
//!
//! let store = InMemoryMembershipStore::new();
//! store.upsert("alice", &GroupSet::from_iter(["admins"])).await?;
//!
//! let entry = store.get("alice").await?.expect("stored");
//! assert!(entry.groups.contains("admins"));
//! ```

mod error;
pub mod memory;
mod traits;
mod types;

pub use error::StoreError;
pub use memory::InMemoryMembershipStore;
pub use traits::MembershipStore;
pub use types::{GroupSet, MembershipEntry, normalize_principal};

/// Type alias for a store result.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for a shareable store trait object.
pub type DynMembershipStore = std::sync::Arc<dyn MembershipStore>;
