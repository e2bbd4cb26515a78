//! In-process doubles for unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rollcall_auth::{IdentityProvider, ProviderError};
use rollcall_storage::{
    GroupSet, InMemoryMembershipStore, MembershipEntry, MembershipStore, StoreError,
};

/// Provider serving a fixed, replaceable roster and counting calls.
pub(crate) struct StubProvider {
    roster: Mutex<BTreeMap<String, GroupSet>>,
    failure: Mutex<Option<(bool, String)>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubProvider {
    pub(crate) fn new<'a, I, G>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, G)>,
        G: IntoIterator<Item = &'a str>,
    {
        Self {
            roster: Mutex::new(
                entries
                    .into_iter()
                    .map(|(id, groups)| (id.to_string(), groups.into_iter().collect()))
                    .collect(),
            ),
            failure: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(err: ProviderError) -> Self {
        let stub = Self::new(Vec::<(&str, Vec<&str>)>::new());
        stub.fail_with(err);
        stub
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn fail_with(&self, err: ProviderError) {
        let failure = (err.is_auth_failure(), err.to_string());
        *self.failure.lock().unwrap() = Some(failure);
    }

    pub(crate) fn set_roster(&self, roster: BTreeMap<String, GroupSet>) {
        *self.roster.lock().unwrap() = roster;
        *self.failure.lock().unwrap() = None;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn fetch_all_principals(&self) -> Result<BTreeMap<String, GroupSet>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = self.failure.lock().unwrap().clone();
        match failure {
            Some((true, message)) => Err(ProviderError::auth_failure(message)),
            Some((false, message)) => Err(ProviderError::unavailable(message)),
            None => Ok(self.roster.lock().unwrap().clone()),
        }
    }
}

/// Store whose every operation fails.
pub(crate) struct FailingStore;

#[async_trait]
impl MembershipStore for FailingStore {
    async fn get(&self, _principal: &str) -> Result<Option<MembershipEntry>, StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn upsert(
        &self,
        _principal: &str,
        _groups: &GroupSet,
    ) -> Result<MembershipEntry, StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }

    async fn list(
        &self,
        _limit: usize,
        _offset: usize,
    ) -> Result<Vec<MembershipEntry>, StoreError> {
        Err(StoreError::unavailable("connection refused"))
    }
}

/// In-memory store that rejects writes for one principal.
pub(crate) struct FlakyStore {
    pub(crate) inner: InMemoryMembershipStore,
    reject: String,
}

impl FlakyStore {
    pub(crate) fn rejecting(principal: &str) -> Self {
        Self {
            inner: InMemoryMembershipStore::new(),
            reject: principal.to_string(),
        }
    }
}

#[async_trait]
impl MembershipStore for FlakyStore {
    async fn get(&self, principal: &str) -> Result<Option<MembershipEntry>, StoreError> {
        self.inner.get(principal).await
    }

    async fn upsert(
        &self,
        principal: &str,
        groups: &GroupSet,
    ) -> Result<MembershipEntry, StoreError> {
        if principal == self.reject {
            return Err(StoreError::unavailable("deadlock detected"));
        }
        self.inner.upsert(principal, groups).await
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.inner.count().await
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<MembershipEntry>, StoreError> {
        self.inner.list(limit, offset).await
    }
}
