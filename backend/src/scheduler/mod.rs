//! Observation scheduler
//!
//! Ranks the observation pool on every tick. Each configured [`Constraint`]
//! either vetoes a candidate or adds to its merit; survivors are ordered by
//! merit plus static priority, and a running observation is kept while its
//! recorded merit still beats the newcomer.

pub mod common;
pub mod constraints;
pub mod dispatch;
pub mod error;
pub mod field_list;

pub use common::CommonProperties;
pub use constraints::{
    Constraint, ConstraintConfig, ConstraintError, ConstraintScore,
};
pub use dispatch::{Availability, HorizonAvailability, RankedObservation, Scheduler};
pub use error::{SchedulerError, SchedulerResult};
pub use field_list::{FieldList, FieldListFile, FieldListSource, StaticFieldList};
