//! Contract window evaluation.
//!
//! An institution's contract window is never stored; it is derived from
//! the optional start/end dates every time a decision needs it. The
//! stored `is_active` flag is a cache for display and is not consulted
//! here.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::days_between;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Expired,
    NotYetStarted,
}

/// Derived contract state of an institution on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractWindow {
    pub status: ContractStatus,
    /// `end - today` in days; negative once expired. `None` without an
    /// end date.
    pub days_remaining: Option<i64>,
}

impl ContractWindow {
    pub fn is_active(&self) -> bool {
        self.status == ContractStatus::Active
    }

    pub fn is_expired(&self) -> bool {
        self.status == ContractStatus::Expired
    }

    /// Days since expiry, when expired.
    pub fn expired_days_ago(&self) -> Option<i64> {
        match (self.status, self.days_remaining) {
            (ContractStatus::Expired, Some(days)) => Some(-days),
            _ => None,
        }
    }
}

/// Evaluate a contract window at day granularity.
///
/// Both boundaries are inclusive: a contract ending today is still
/// active, one starting today is already active. When the dates are
/// inverted and both "expired" and "not yet started" hold, expiry wins.
pub fn evaluate(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> ContractWindow {
    let days_remaining = end.map(|end| days_between(today, end));

    let status = if end.is_some_and(|end| end < today) {
        ContractStatus::Expired
    } else if start.is_some_and(|start| start > today) {
        ContractStatus::NotYetStarted
    } else {
        ContractStatus::Active
    };

    ContractWindow {
        status,
        days_remaining,
    }
}

/// Whether an edited contract should reactivate an inactive institution:
/// the end date must be present and `start <= today <= end`.
pub fn is_reactivation_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> bool {
    match end {
        Some(end) => start.is_none_or(|start| start <= today) && today <= end,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn no_dates_is_active_without_days_remaining() {
        let w = evaluate(None, None, date("2025-05-05"));
        assert_eq!(w.status, ContractStatus::Active);
        assert_eq!(w.days_remaining, None);
    }

    #[test]
    fn end_today_is_active() {
        let today = date("2025-05-05");
        let w = evaluate(None, Some(today), today);
        assert_eq!(w.status, ContractStatus::Active);
        assert_eq!(w.days_remaining, Some(0));
    }

    #[test]
    fn end_yesterday_is_expired() {
        let w = evaluate(None, Some(date("2025-05-04")), date("2025-05-05"));
        assert_eq!(w.status, ContractStatus::Expired);
        assert_eq!(w.days_remaining, Some(-1));
        assert_eq!(w.expired_days_ago(), Some(1));
    }

    #[test]
    fn start_today_is_active() {
        let today = date("2025-05-05");
        let w = evaluate(Some(today), Some(date("2025-12-31")), today);
        assert_eq!(w.status, ContractStatus::Active);
        assert_eq!(w.days_remaining, Some(240));
    }

    #[test]
    fn future_start_without_end_is_not_yet_started() {
        let w = evaluate(Some(date("2025-06-01")), None, date("2025-05-05"));
        assert_eq!(w.status, ContractStatus::NotYetStarted);
        assert_eq!(w.days_remaining, None);
    }

    #[test]
    fn only_end_date_gates_alone() {
        let w = evaluate(None, Some(date("2030-01-01")), date("2025-05-05"));
        assert!(w.is_active());
    }

    #[test]
    fn inverted_dates_resolve_to_expired() {
        // Start after end, today after both.
        let w = evaluate(
            Some(date("2024-01-01")),
            Some(date("2023-12-31")),
            date("2024-06-01"),
        );
        assert_eq!(w.status, ContractStatus::Expired);

        // Today before start but after end.
        let w = evaluate(
            Some(date("2024-03-01")),
            Some(date("2024-01-31")),
            date("2024-02-15"),
        );
        assert_eq!(w.status, ContractStatus::Expired);
    }

    #[test]
    fn reactivation_requires_end_date() {
        let today = date("2025-05-05");
        assert!(!is_reactivation_window(Some(date("2025-01-01")), None, today));
        assert!(is_reactivation_window(
            Some(date("2024-01-01")),
            Some(date("2099-01-01")),
            today
        ));
        assert!(is_reactivation_window(None, Some(today), today));
        assert!(!is_reactivation_window(
            Some(date("2025-06-01")),
            Some(date("2099-01-01")),
            today
        ));
        assert!(!is_reactivation_window(None, Some(date("2025-05-04")), today));
    }
}
