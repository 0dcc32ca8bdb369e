//! campusgate core: domain models, contract evaluation, and the record
//! store abstraction shared by every other crate.

pub mod clock;
pub mod contract;
pub mod error;
pub mod memory;
pub mod models;
pub mod repository;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use contract::{ContractStatus, ContractWindow};
pub use error::{CampusError, CampusResult};
pub use memory::MemoryRecordStore;
pub use store::{Collection, Filter, Predicate, Record, RecordStore};
