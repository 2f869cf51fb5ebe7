//! Handlers of the nightly sequence.

mod calibrating;
mod observing;
mod ready;
mod scheduling;
mod shutdown;

pub use calibrating::Calibrating;
pub use observing::{Analyzing, Observing, Pointing, Slewing};
pub use ready::Ready;
pub use scheduling::Scheduling;
pub use shutdown::{Housekeeping, Parked, Parking};

use serde::{Deserialize, Serialize};

use super::graph::StateName;
use super::machine::HandlerRegistry;

/// Tunables for the default handlers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandlerOptions {
    #[serde(default = "default_reread_field_list")]
    pub reread_field_list: bool,
}

fn default_reread_field_list() -> bool {
    true
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            reread_field_list: default_reread_field_list(),
        }
    }
}

/// One handler for every non-terminal state of the nightly graph.
pub fn default_handlers(options: &HandlerOptions) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    handlers.insert(StateName::Ready, Box::new(Ready));
    handlers.insert(StateName::Calibrating, Box::new(Calibrating));
    handlers.insert(
        StateName::Scheduling,
        Box::new(Scheduling {
            reread_field_list: options.reread_field_list,
        }),
    );
    handlers.insert(StateName::Slewing, Box::new(Slewing));
    handlers.insert(StateName::Pointing, Box::new(Pointing));
    handlers.insert(StateName::Observing, Box::new(Observing));
    handlers.insert(StateName::Analyzing, Box::new(Analyzing));
    handlers.insert(StateName::Parking, Box::new(Parking));
    handlers.insert(StateName::Parked, Box::new(Parked));
    handlers.insert(StateName::Housekeeping, Box::new(Housekeeping));
    handlers
}
