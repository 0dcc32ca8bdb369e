//! Domain models for campusgate.
//!
//! These are the record shapes stored in the collections of the record
//! store, plus the principal derived from a signed-in user.

pub mod admin_credential;
pub mod institution;
pub mod membership;
pub mod teacher;
pub mod user;
