//! Fail-safe state machine driving the nightly sequence.
//!
//! The graph of states is fixed at startup and validated once. Each
//! non-terminal state has a [`StateHandler`] that reports its successor as an
//! [`Outcome`]; the [`StateMachine`] checks the successor against the graph
//! and falls back towards the safe state whenever a handler fails.

pub mod error;
pub mod graph;
pub mod handler;
pub mod machine;
pub mod model;
pub mod states;

pub use error::EngineError;
pub use graph::{nightly_states, StateGraph, StateName, StateSpec};
pub use handler::{guarded, HandlerError, Outcome, StateHandler};
pub use machine::{HandlerRegistry, RunSummary, StateMachine, StopSignal};
pub use model::{LogNotifier, Model, Notifier, RecordingNotifier};
pub use states::{default_handlers, HandlerOptions};
