//! Full-roster reconciliation.
//!
//! [`Reconciler::reconcile_once`] pulls the provider's whole roster and
//! upserts every principal into the membership store. The roster is fetched
//! completely before the first write, so a failed fetch writes nothing.
//! Principals missing from the roster are left untouched.
//!
//! [`ReconciliationScheduler`] fires runs on a cron schedule in the
//! background and stops when its `watch` channel flips to `true`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use croner::Cron;
use futures_util::stream::{self, StreamExt};
use rollcall_auth::DynIdentityProvider;
use rollcall_storage::{DynMembershipStore, GroupSet, normalize_principal};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ReconcileConfig;
use crate::error::ReconcileError;

// =============================================================================
// Policy and Report
// =============================================================================

/// What a run does when a single upsert fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertFailurePolicy {
    /// Stop at the first failure and fail the run.
    #[default]
    Abort,
    /// Record the failure and keep going.
    Continue,
}

/// A principal whose upsert failed under [`UpsertFailurePolicy::Continue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertFailure {
    pub principal: String,
    pub error: String,
}

/// Summary of one completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Principals in the fetched roster.
    pub fetched: usize,
    /// Principals written.
    pub upserted: usize,
    pub failures: Vec<UpsertFailure>,
    /// Roster keys that were not written because they are blank or collide
    /// with another key after trimming.
    pub skipped: Vec<String>,
    pub duration_ms: u64,
}

impl ReconcileReport {
    /// Returns `true` if every valid roster entry was written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.upserted + self.skipped.len() == self.fetched
    }
}

/// Run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Runs started, including rejected concurrent attempts.
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Executes reconciliation runs. Runs never overlap.
pub struct Reconciler {
    provider: DynIdentityProvider,
    store: DynMembershipStore,
    concurrency: usize,
    max_run_duration: Duration,
    policy: UpsertFailurePolicy,
    running: Mutex<()>,
    runs: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        provider: DynIdentityProvider,
        store: DynMembershipStore,
        config: &ReconcileConfig,
    ) -> Self {
        Self {
            provider,
            store,
            concurrency: config.concurrency.max(1),
            max_run_duration: config.max_run_duration,
            policy: config.on_upsert_failure,
            running: Mutex::new(()),
            runs: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Runs one reconciliation.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::AlreadyRunning`] if another run is in progress
    /// - [`ReconcileError::Fetch`] if the roster fetch fails; nothing is written
    /// - [`ReconcileError::Upsert`] on the first store failure under
    ///   [`UpsertFailurePolicy::Abort`]
    /// - [`ReconcileError::TimedOut`] if the run exceeds `max_run_duration`
    pub async fn reconcile_once(&self) -> Result<ReconcileReport, ReconcileError> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let Ok(_guard) = self.running.try_lock() else {
            warn!("Reconciliation requested while a run is in progress");
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(ReconcileError::AlreadyRunning);
        };

        let result = match tokio::time::timeout(self.max_run_duration, self.run()).await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::TimedOut {
                limit: self.max_run_duration,
            }),
        };

        match &result {
            Ok(report) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                info!(
                    fetched = report.fetched,
                    upserted = report.upserted,
                    failed = report.failures.len(),
                    duration_ms = report.duration_ms,
                    "Reconciliation completed"
                );
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, kind = %e.kind(), "Reconciliation failed");
            }
        }
        result
    }

    async fn run(&self) -> Result<ReconcileReport, ReconcileError> {
        let started = Instant::now();
        let started_at = OffsetDateTime::now_utc();

        let roster = self
            .provider
            .fetch_all_principals()
            .await
            .map_err(ReconcileError::Fetch)?;
        let fetched = roster.len();
        let (roster, skipped) = normalize_roster(roster);
        debug!(fetched, skipped = skipped.len(), "Roster fetched, applying upserts");

        let store = &self.store;
        let mut writes = stream::iter(roster)
            .map(|(principal, groups)| async move {
                let result = store.upsert(&principal, &groups).await;
                (principal, result)
            })
            .buffer_unordered(self.concurrency);

        let mut upserted = 0;
        let mut failures = Vec::new();
        while let Some((principal, result)) = writes.next().await {
            match result {
                Ok(_) => upserted += 1,
                Err(source) => match self.policy {
                    UpsertFailurePolicy::Abort => {
                        return Err(ReconcileError::Upsert { principal, source });
                    }
                    UpsertFailurePolicy::Continue => {
                        warn!(principal = %principal, error = %source, "Upsert failed, continuing");
                        failures.push(UpsertFailure {
                            principal,
                            error: source.to_string(),
                        });
                    }
                },
            }
        }

        Ok(ReconcileReport {
            started_at,
            fetched,
            upserted,
            failures,
            skipped,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Current run counters.
    #[must_use]
    pub fn stats(&self) -> ReconcileStats {
        ReconcileStats {
            runs: self.runs.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Trims roster keys and drops the ones that cannot be stored.
///
/// Blank keys are dropped. When several keys trim to the same identifier the
/// key that was already trimmed wins, otherwise the first in key order. The
/// dropped raw keys are returned in key order.
fn normalize_roster(roster: BTreeMap<String, GroupSet>) -> (BTreeMap<String, GroupSet>, Vec<String>) {
    let mut normalized: BTreeMap<String, (String, GroupSet)> = BTreeMap::new();
    let mut skipped = Vec::new();

    for (raw, groups) in roster {
        let Ok(principal) = normalize_principal(&raw) else {
            warn!(principal = ?raw, "Skipping blank roster key");
            skipped.push(raw);
            continue;
        };
        let principal = principal.to_string();
        match normalized.get_mut(&principal) {
            None => {
                normalized.insert(principal, (raw, groups));
            }
            Some(kept) if raw == principal => {
                warn!(principal = ?kept.0, duplicate_of = %principal, "Skipping roster key that collides after trimming");
                let replaced = std::mem::replace(kept, (raw, groups));
                skipped.push(replaced.0);
            }
            Some(_) => {
                warn!(principal = ?raw, duplicate_of = %principal, "Skipping roster key that collides after trimming");
                skipped.push(raw);
            }
        }
    }

    skipped.sort();
    let roster = normalized
        .into_iter()
        .map(|(principal, (_, groups))| (principal, groups))
        .collect();
    (roster, skipped)
}

// =============================================================================
// Scheduler
// =============================================================================

/// Cron-driven background runner for a [`Reconciler`].
pub struct ReconciliationScheduler {
    reconciler: Arc<Reconciler>,
    schedule: Cron,
    expression: String,
    run_on_startup: bool,
}

impl ReconciliationScheduler {
    /// Creates a scheduler for the configured cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidSchedule`] if the expression does not
    /// parse.
    pub fn new(reconciler: Arc<Reconciler>, config: &ReconcileConfig) -> Result<Self, ReconcileError> {
        let schedule = Cron::new(&config.schedule)
            .parse()
            .map_err(|e| ReconcileError::InvalidSchedule {
                expression: config.schedule.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            reconciler,
            schedule,
            expression: config.schedule.clone(),
            run_on_startup: config.run_on_startup,
        })
    }

    /// Next fire time strictly after `after`.
    #[must_use]
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.find_next_occurrence(&after, false).ok()
    }

    /// Starts the scheduler in a background task.
    ///
    /// Returns a shutdown sender and the task handle. Sending `true` stops
    /// the loop; a run in progress is allowed to finish.
    pub fn start(self) -> (watch::Sender<bool>, JoinHandle<()>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(shutdown_rx));
        (shutdown_tx, handle)
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            schedule = %self.expression,
            run_on_startup = self.run_on_startup,
            "Reconciliation scheduler started"
        );

        if self.run_on_startup {
            // Failures are logged and counted by the reconciler.
            let _ = self.reconciler.reconcile_once().await;
        }

        loop {
            let now = Utc::now();
            let Some(next) = self.next_fire_after(now) else {
                warn!(schedule = %self.expression, "Schedule has no future occurrence, stopping");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(next = %next, wait_secs = wait.as_secs(), "Next reconciliation scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let _ = self.reconciler.reconcile_once().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reconciliation scheduler shutting down");
    }
}
