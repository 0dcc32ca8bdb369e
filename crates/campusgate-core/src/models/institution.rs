//! Institution domain model.
//!
//! Institutions are the tenants of the system. Teachers and students
//! reach the application through memberships in an institution, and the
//! institution's contract window gates that access.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contract::{self, ContractWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionType {
    #[default]
    School,
    University,
    Company,
    Individual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Overdue,
}

/// A tenant organization with a contract window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    pub id: Uuid,
    /// Display name. The individual-users bucket is found by this name.
    pub name: String,
    #[serde(rename = "type", default)]
    pub institution_type: InstitutionType,
    /// Login gate as last written by an admin or the reconciler.
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub contract_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub contract_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    /// `None` means no limit.
    #[serde(default)]
    pub max_teachers: Option<u32>,
    #[serde(default)]
    pub max_students: Option<u32>,
    /// Teacher record holding institution-wide supervision.
    #[serde(default)]
    pub guidance_teacher_id: Option<Uuid>,
}

impl Institution {
    /// Contract window of this institution on `today`.
    pub fn contract_window(&self, today: NaiveDate) -> ContractWindow {
        contract::evaluate(self.contract_start_date, self.contract_end_date, today)
    }
}

/// Fields required to create a new institution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstitution {
    pub name: String,
    #[serde(rename = "type")]
    pub institution_type: InstitutionType,
    pub is_active: bool,
    pub is_premium: bool,
    pub contract_start_date: Option<NaiveDate>,
    pub contract_end_date: Option<NaiveDate>,
    pub payment_status: PaymentStatus,
    pub max_teachers: Option<u32>,
    pub max_students: Option<u32>,
}

impl CreateInstitution {
    /// An active institution with no contract dates and no limits.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            institution_type: InstitutionType::School,
            is_active: true,
            is_premium: false,
            contract_start_date: None,
            contract_end_date: None,
            payment_status: PaymentStatus::Pending,
            max_teachers: None,
            max_students: None,
        }
    }
}

/// A contract edit made by an administrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ContractEdit {
    pub contract_start_date: Option<NaiveDate>,
    pub contract_end_date: Option<NaiveDate>,
}
