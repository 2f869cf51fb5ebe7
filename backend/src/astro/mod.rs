//! Site-level astronomy used by the scheduler and the state handlers.
//!
//! Night boundaries come from `siderust`. Instantaneous Sun and target
//! altitudes use low-precision analytic series (good to a few arc minutes),
//! which is ample for the flat-field window and horizon checks.

pub mod observer;
pub mod solar;

pub use observer::Observer;
pub use solar::{greenwich_sidereal_degrees, sun_position};
