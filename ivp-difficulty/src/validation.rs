//! Difficulty state validation
//!
//! Three independent checks per session:
//! 1. State invariants: the stored blob's change chain is continuous
//! 2. Cache consistency: a cached state matches the stored blob exactly
//! 3. Column consistency: denormalized columns match the stored blob
//!
//! Violations are reported, never corrected here; repair is the job of
//! [`crate::recovery::RecoveryService`].

use crate::manager::DifficultyStateManager;
use crate::state::SessionDifficultyState;
use ivp_common::db::PersistedSessionRecord;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Overall health, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    /// Usable, but mirrors disagree or history is missing
    Degraded,
    /// No trustworthy state; recovery required
    Broken,
}

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub violations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CheckResult {
    fn from_violations(violations: Vec<String>) -> Self {
        let status = if violations.is_empty() {
            CheckStatus::Passed
        } else {
            CheckStatus::Failed
        };
        Self {
            status,
            violations,
            note: None,
        }
    }

    fn failed(violation: impl Into<String>) -> Self {
        Self::from_violations(vec![violation.into()])
    }

    fn skipped(note: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Skipped,
            violations: Vec::new(),
            note: Some(note.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == CheckStatus::Failed
    }
}

/// Validation result for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionValidationReport {
    pub session_id: Uuid,
    pub status: HealthStatus,
    pub record_found: bool,
    pub state_found: bool,
    pub state_invariants: CheckResult,
    pub cache_consistency: CheckResult,
    pub column_consistency: CheckResult,
    /// Problems outside the three checks (missing row, missing blob, store errors)
    pub notes: Vec<String>,
}

impl SessionValidationReport {
    /// Every violation across the checks, prefixed with the check name
    pub fn violations(&self) -> Vec<String> {
        let checks = [
            ("state", &self.state_invariants),
            ("cache", &self.cache_consistency),
            ("columns", &self.column_consistency),
        ];

        let mut all: Vec<String> = self.notes.clone();
        for (name, check) in checks {
            all.extend(check.violations.iter().map(|v| format!("{}: {}", name, v)));
        }
        all
    }
}

/// What a health check covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "id", rename_all = "lowercase")]
pub enum HealthScope {
    Session(Uuid),
    User(Uuid),
    System,
}

/// A session that did not come back healthy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionIssue {
    pub session_id: Uuid,
    pub status: HealthStatus,
    pub violations: Vec<String>,
}

/// Aggregated health over a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub scope: HealthScope,
    /// Worst status of any checked session
    pub status: HealthStatus,
    pub sessions_checked: usize,
    pub sessions_with_issues: usize,
    pub issues: Vec<SessionIssue>,
    /// Errors that prevented checking at all
    pub errors: Vec<String>,
}

/// Consistency checks over manager, cache and store
pub struct ValidationService {
    manager: Arc<DifficultyStateManager>,
}

impl ValidationService {
    pub fn new(manager: Arc<DifficultyStateManager>) -> Self {
        Self { manager }
    }

    /// Run all three checks for one session
    pub async fn validate_session(&self, session_id: Uuid) -> SessionValidationReport {
        let record = match self.manager.store().load_record(session_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Session {}: validation could not load record: {}", session_id, e);
                return Self::unchecked(session_id, HealthStatus::Broken, format!("store error: {}", e));
            }
        };

        let Some(record) = record else {
            return Self::unchecked(session_id, HealthStatus::Broken, "session record not found");
        };

        if !record.has_state_json() {
            let mut report = Self::unchecked(
                session_id,
                HealthStatus::Degraded,
                "no difficulty state blob, columns only",
            );
            report.record_found = true;
            return report;
        }

        let stored = record
            .difficulty_state_json
            .as_deref()
            .map(SessionDifficultyState::from_json);

        let (state_invariants, stored_state) = match stored {
            Some(Ok(state)) if state.session_id() != session_id => (
                CheckResult::failed(format!("blob belongs to session {}", state.session_id())),
                None,
            ),
            Some(Ok(state)) => (CheckResult::from_violations(state.validate()), Some(state)),
            Some(Err(e)) => (CheckResult::failed(format!("blob unreadable: {}", e)), None),
            None => (CheckResult::skipped("no state blob"), None),
        };

        let cache_consistency = self.check_cache(session_id, stored_state.as_ref()).await;
        let column_consistency = match &stored_state {
            Some(state) => CheckResult::from_violations(column_violations(&record, state)),
            None => CheckResult::skipped("no readable state blob"),
        };

        let status = if state_invariants.is_failed() {
            HealthStatus::Broken
        } else if cache_consistency.is_failed() || column_consistency.is_failed() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Ok
        };

        if status != HealthStatus::Ok {
            warn!("Session {}: difficulty state validation {:?}", session_id, status);
        } else {
            debug!("Session {}: difficulty state valid", session_id);
        }

        SessionValidationReport {
            session_id,
            status,
            record_found: true,
            state_found: stored_state.is_some(),
            state_invariants,
            cache_consistency,
            column_consistency,
            notes: Vec::new(),
        }
    }

    /// Validate every session in a scope and aggregate
    pub async fn health_check(&self, scope: HealthScope) -> HealthReport {
        let session_ids = match scope {
            HealthScope::Session(id) => Ok(vec![id]),
            HealthScope::User(user_id) => self.manager.store().list_session_ids(Some(user_id)).await,
            HealthScope::System => self.manager.store().list_session_ids(None).await,
        };

        let mut report = HealthReport {
            scope,
            status: HealthStatus::Ok,
            sessions_checked: 0,
            sessions_with_issues: 0,
            issues: Vec::new(),
            errors: Vec::new(),
        };

        let session_ids = match session_ids {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Health check {:?}: could not list sessions: {}", scope, e);
                report.status = HealthStatus::Broken;
                report.errors.push(format!("could not list sessions: {}", e));
                return report;
            }
        };

        for session_id in session_ids {
            let session_report = self.validate_session(session_id).await;
            report.sessions_checked += 1;
            report.status = report.status.max(session_report.status);

            if session_report.status != HealthStatus::Ok {
                report.sessions_with_issues += 1;
                report.issues.push(SessionIssue {
                    session_id,
                    status: session_report.status,
                    violations: session_report.violations(),
                });
            }
        }

        info!(
            "Health check {:?}: {:?} ({} sessions, {} with issues)",
            scope, report.status, report.sessions_checked, report.sessions_with_issues
        );
        report
    }

    async fn check_cache(
        &self,
        session_id: Uuid,
        stored: Option<&SessionDifficultyState>,
    ) -> CheckResult {
        let Some(cached) = self.manager.cached_state(session_id).await else {
            return CheckResult::skipped("session not cached");
        };

        match stored {
            Some(stored) if stored.to_record() == cached.to_record() => {
                CheckResult::from_violations(Vec::new())
            }
            Some(stored) => CheckResult::failed(format!(
                "cached state (current {}, {} changes, finalized {}) differs from stored state (current {}, {} changes, finalized {})",
                cached.current_difficulty(),
                cached.changes().len(),
                cached.is_finalized(),
                stored.current_difficulty(),
                stored.changes().len(),
                stored.is_finalized()
            )),
            None => CheckResult::failed("session cached but stored blob unreadable"),
        }
    }

    fn unchecked(
        session_id: Uuid,
        status: HealthStatus,
        note: impl Into<String>,
    ) -> SessionValidationReport {
        SessionValidationReport {
            session_id,
            status,
            record_found: false,
            state_found: false,
            state_invariants: CheckResult::skipped("no state to check"),
            cache_consistency: CheckResult::skipped("no state to check"),
            column_consistency: CheckResult::skipped("no state to check"),
            notes: vec![note.into()],
        }
    }
}

/// Differences between denormalized columns and the blob they mirror
pub fn column_violations(
    record: &PersistedSessionRecord,
    state: &SessionDifficultyState,
) -> Vec<String> {
    let mut violations = Vec::new();

    let columns = [
        (
            "initial_difficulty_level",
            &record.initial_difficulty_level,
            Some(state.initial_difficulty()),
        ),
        (
            "current_difficulty_level",
            &record.current_difficulty_level,
            Some(state.current_difficulty()),
        ),
        (
            "final_difficulty_level",
            &record.final_difficulty_level,
            state.final_difficulty(),
        ),
    ];

    for (name, column, expected) in columns {
        let parsed = column.as_deref().map(ivp_common::DifficultyLevel::parse);
        let matches = match (parsed, expected) {
            (None, None) => true,
            (Some(Some(actual)), Some(expected)) => actual == expected,
            _ => false,
        };
        if !matches {
            violations.push(format!(
                "{} is {:?} but state has {}",
                name,
                column,
                expected.map(|l| l.as_token()).unwrap_or("none")
            ));
        }
    }

    if record.difficulty_changes_count != state.changes().len() as i64 {
        violations.push(format!(
            "difficulty_changes_count is {} but state has {} changes",
            record.difficulty_changes_count,
            state.changes().len()
        ));
    }

    violations
}
