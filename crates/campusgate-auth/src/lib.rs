//! campusgate access layer: access decisions, contract reconciliation,
//! credential verification and session projection.

pub mod admin;
pub mod config;
pub mod decision;
pub mod error;
pub mod guidance;
pub mod identity;
pub mod password;
pub mod projection;
pub mod reconciler;
pub mod rpc;
pub mod service;

pub use config::{AccessConfig, BackendConfig, INDIVIDUAL_USERS_INSTITUTION};
pub use decision::{AccessDecisionEngine, Decision, DenyReason, Grant, GrantBasis};
pub use error::AccessError;
pub use reconciler::{ReconcileReport, ReconcileScope, Reconciler, ReconcilerJob};
pub use service::AccessService;
