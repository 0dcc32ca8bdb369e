//! Institution lifecycle reconciler.
//!
//! Brings the stored `is_active`/`is_premium` flags of institutions and
//! their memberships in line with contract dates: expired contracts are
//! deactivated, and an edited contract covering today reactivates. Both
//! directions are idempotent and best effort per row.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use campusgate_core::clock::Clock;
use campusgate_core::contract;
use campusgate_core::error::{CampusError, CampusResult};
use campusgate_core::models::institution::{ContractEdit, Institution};
use campusgate_core::repository::{InstitutionRepository, MembershipRepository};
use campusgate_core::store::{Filter, RecordStore};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileScope {
    Institution(Uuid),
    /// Every institution still marked active.
    AllActive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileFailure {
    /// `None` when the scan query itself failed.
    pub institution_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub institutions_deactivated: usize,
    pub institutions_reactivated: usize,
    pub memberships_deactivated: u64,
    pub memberships_reactivated: u64,
    pub failures: Vec<ReconcileFailure>,
    /// Another pass was already running; nothing was done.
    pub skipped: bool,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, institution_id: Option<Uuid>, err: &CampusError) {
        self.failures.push(ReconcileFailure {
            institution_id,
            message: err.to_string(),
        });
    }
}

/// Clears the in-flight flag when a pass ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Reconciler<S> {
    institutions: InstitutionRepository<S>,
    memberships: MembershipRepository<S>,
    clock: Arc<dyn Clock>,
    in_flight: AtomicBool,
}

impl<S: RecordStore + Clone> Reconciler<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            institutions: InstitutionRepository::new(store.clone()),
            memberships: MembershipRepository::new(store),
            clock,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Deactivate institutions whose contract ended before today, and
    /// all of their memberships.
    ///
    /// At most one pass runs at a time; an overlapping call returns a
    /// report with `skipped` set. A failing row is logged and reported
    /// without aborting the rest of the pass.
    pub async fn deactivate_expired(&self, scope: ReconcileScope) -> ReconcileReport {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!(?scope, "reconcile pass already running, skipping");
            return ReconcileReport {
                skipped: true,
                ..ReconcileReport::default()
            };
        };
        let mut report = ReconcileReport::default();
        self.run_deactivation(scope, &mut report).await;
        report
    }

    async fn run_deactivation(&self, scope: ReconcileScope, report: &mut ReconcileReport) {
        let today = self.clock.today();
        let candidates = match scope {
            ReconcileScope::AllActive => self.institutions.expired_before(today, true).await,
            ReconcileScope::Institution(id) => {
                self.institutions
                    .list(
                        &Filter::by_id(id)
                            .not_null("contract_end_date")
                            .lt("contract_end_date", today.to_string()),
                    )
                    .await
            }
        };
        let candidates = match candidates {
            Ok(rows) => rows,
            Err(e) => {
                error!(?scope, error = %e, "failed to query expired institutions");
                report.fail(None, &e);
                return;
            }
        };

        for institution in candidates {
            report.scanned += 1;
            match self.deactivate_one(&institution).await {
                Ok((flagged, memberships)) => {
                    if flagged {
                        report.institutions_deactivated += 1;
                    }
                    report.memberships_deactivated += memberships;
                    if flagged || memberships > 0 {
                        info!(
                            institution_id = %institution.id,
                            contract_end_date = ?institution.contract_end_date,
                            memberships,
                            "deactivated expired institution"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        institution_id = %institution.id,
                        error = %e,
                        "failed to deactivate institution"
                    );
                    report.fail(Some(institution.id), &e);
                }
            }
        }
    }

    async fn deactivate_one(&self, institution: &Institution) -> CampusResult<(bool, u64)> {
        let flagged = if institution.is_active || institution.is_premium {
            let written = self.institutions.set_flags(institution, false, false).await?;
            if !written {
                debug!(institution_id = %institution.id, "institution changed concurrently");
            }
            written
        } else {
            false
        };
        let memberships = self
            .memberships
            .set_active_for_institution(institution.id, false)
            .await?;
        Ok((flagged, memberships))
    }

    /// Store new contract dates and bring the flags in line with them.
    ///
    /// An inactive institution whose new window covers today is
    /// reactivated along with its memberships. A window that already
    /// ended deactivates the institution right away.
    ///
    /// A membership cascade that fails after the institution was
    /// reactivated is recorded in the report's `failures`, leaving the
    /// institution active with its memberships unchanged.
    pub async fn apply_contract_edit(
        &self,
        id: Uuid,
        edit: ContractEdit,
    ) -> CampusResult<ReconcileReport> {
        if let (Some(start), Some(end)) = (edit.contract_start_date, edit.contract_end_date) {
            if start > end {
                return Err(CampusError::validation(
                    "contract start date must not be after its end date",
                ));
            }
        }

        let institution = self.institutions.update_contract(id, edit).await?;
        let today = self.clock.today();
        let mut report = ReconcileReport::default();

        let reactivate = !institution.is_active
            && contract::is_reactivation_window(
                institution.contract_start_date,
                institution.contract_end_date,
                today,
            );
        if reactivate {
            report.scanned = 1;
            if self.institutions.set_flags(&institution, true, true).await? {
                report.institutions_reactivated = 1;
            }
            match self.memberships.set_active_for_institution(id, true).await {
                Ok(changed) => {
                    report.memberships_reactivated = changed;
                    info!(
                        institution_id = %id,
                        memberships = changed,
                        "reactivated institution after contract edit"
                    );
                }
                Err(e) => {
                    warn!(institution_id = %id, error = %e, "failed to reactivate memberships");
                    report.fail(Some(id), &e);
                }
            }
        } else if institution.contract_window(today).is_expired() {
            self.run_deactivation(ReconcileScope::Institution(id), &mut report)
                .await;
        }
        Ok(report)
    }
}

/// Periodic reconciliation on a background task.
///
/// The first pass runs immediately. Ticks that fall due while a pass is
/// still running are skipped. Dropping the job aborts the task.
pub struct ReconcilerJob {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ReconcilerJob {
    pub fn spawn<S>(reconciler: Arc<Reconciler<S>>, interval: Duration) -> Self
    where
        S: RecordStore + Clone + 'static,
    {
        let (shutdown, mut stop) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = ticker.tick() => {
                        let report = reconciler.deactivate_expired(ReconcileScope::AllActive).await;
                        if !report.is_clean() {
                            warn!(
                                failures = report.failures.len(),
                                "reconcile pass finished with failures"
                            );
                        } else {
                            debug!(
                                scanned = report.scanned,
                                deactivated = report.institutions_deactivated,
                                "reconcile pass finished"
                            );
                        }
                    }
                }
            }
            debug!("reconciler job stopped");
        });
        Self {
            shutdown: Some(shutdown),
            task,
        }
    }

    /// Stop the job and wait for an in-progress pass to finish.
    pub async fn cancel(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ReconcilerJob {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let first = InFlight::acquire(&flag);
        assert!(first.is_some());
        assert!(InFlight::acquire(&flag).is_none());
        drop(first);
        assert!(InFlight::acquire(&flag).is_some());
    }
}
