//! # obsctl
//!
//! Autonomous control of an unattended observatory.
//!
//! The crate decides what to observe and drives the hardware through the
//! night, degrading to a parked, safe observatory whenever something goes
//! wrong.
//!
//! ## Features
//!
//! - **Scheduling**: Rank the field list under vetoing, merit-accumulating constraints
//! - **Hysteresis**: Keep a running observation while it still beats newcomers
//! - **State Machine**: Validated nightly state graph with fail-safe fallbacks
//! - **Hardware**: Camera exposure lifecycle, gphoto2 driver and a simulated observatory
//! - **Time Handling**: Modified Julian Date conversions and twilight computations
//!
//! ## Architecture
//!
//! - [`models`]: Observations, exposure plans and time types
//! - [`astro`]: Observing site, Sun position and end-of-night search
//! - [`scheduler`]: Constraints, field-list sources and the dispatch scheduler
//! - [`hardware`]: Camera and observatory abstractions with their implementations
//! - [`state`]: State graph, handler contract, nightly handlers and the engine
//! - [`config`]: TOML configuration assembling all of the above
//!
//! ## Example
//!
//! ```
//! use obsctl::astro::Observer;
//! use obsctl::models::{ModifiedJulianDate, Observation};
//! use obsctl::scheduler::{ConstraintConfig, Scheduler};
//!
//! let constraints = ConstraintConfig::defaults().iter().map(ConstraintConfig::build).collect();
//! let mut scheduler = Scheduler::new(Observer::new("equator", 0.0, 0.0), constraints);
//! scheduler.add_observation(Observation::new("flat field", 1.0)).unwrap();
//!
//! let ranked = scheduler
//!     .get_observation(Some(ModifiedJulianDate::new(60000.0)), true, false)
//!     .unwrap();
//! assert_eq!(ranked[0].name, "flat field");
//! ```

pub mod astro;
pub mod config;
pub mod hardware;
pub mod models;
pub mod scheduler;
pub mod state;
