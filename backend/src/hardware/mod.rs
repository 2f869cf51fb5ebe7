//! Hardware collaborators driven by the state handlers.

pub mod camera;
pub mod error;
pub mod gphoto;
pub mod observatory;
pub mod simulator;

pub use camera::{Camera, ExposureRecord, PendingExposure, SimulatedCamera};
pub use error::{HardwareError, HardwareResult};
pub use gphoto::GphotoCamera;
pub use observatory::Observatory;
pub use simulator::{MountState, Operation, SimulatedObservatory, SimulatorTiming};
