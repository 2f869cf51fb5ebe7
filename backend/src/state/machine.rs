//! The state machine engine.
//!
//! Owns the active state, runs its handler, and moves to the successor the
//! handler reports after checking it against the graph. Failures go to the
//! state's fallback; a failure with no fallback halts the engine.
//!
//! Stop requests and unsafe weather are looked at between states only. When
//! either is raised the engine abandons the night by heading for the safe
//! state, then walks the shutdown path to the terminal state.

use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::EngineError;
use super::graph::{StateGraph, StateName};
use super::handler::{Outcome, StateHandler};
use super::model::{Model, Notifier};
use crate::hardware::Observatory;
use crate::scheduler::Scheduler;

pub type HandlerRegistry = BTreeMap<StateName, Box<dyn StateHandler>>;

/// Cross-thread request to end the night.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What happened during one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub final_state: StateName,
    pub transitions: usize,
    pub fallbacks: usize,
    /// False when the run hit the transition limit before the terminal state.
    pub completed: bool,
    pub visited: Vec<StateName>,
}

impl RunSummary {
    fn new(initial: StateName) -> Self {
        Self {
            final_state: initial,
            transitions: 0,
            fallbacks: 0,
            completed: false,
            visited: vec![initial],
        }
    }
}

pub struct StateMachine {
    graph: StateGraph,
    handlers: HandlerRegistry,
    stop: StopSignal,
    max_transitions: Option<usize>,
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("graph", &self.graph)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("max_transitions", &self.max_transitions)
            .finish()
    }
}

impl StateMachine {
    /// Fails if a non-terminal state has no handler.
    pub fn new(graph: StateGraph, handlers: HandlerRegistry) -> Result<Self, EngineError> {
        for spec in graph.states() {
            if !graph.is_terminal(spec.name) && !handlers.contains_key(&spec.name) {
                return Err(EngineError::MissingHandler(spec.name));
            }
        }

        Ok(Self {
            graph,
            handlers,
            stop: StopSignal::new(),
            max_transitions: None,
        })
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_max_transitions(mut self, max_transitions: Option<usize>) -> Self {
        self.max_transitions = max_transitions;
        self
    }

    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Runs from the initial state until the terminal state is reached.
    pub fn run(
        &self,
        scheduler: &mut Scheduler,
        observatory: &mut dyn Observatory,
        notifier: &dyn Notifier,
    ) -> Result<RunSummary, EngineError> {
        let initial = self.graph.initial();
        let mut model = Model::new(initial, scheduler, observatory, notifier);
        let mut summary = RunSummary::new(initial);
        info!("Starting in state {}", initial);

        while !self.graph.is_terminal(model.current_state) {
            if let Some(limit) = self.max_transitions {
                if summary.transitions >= limit {
                    warn!(
                        "Stopping after {} transitions in state {}",
                        summary.transitions, model.current_state
                    );
                    summary.final_state = model.current_state;
                    return Ok(summary);
                }
            }
            self.step(&mut model, &mut summary)?;
        }

        summary.final_state = model.current_state;
        summary.completed = true;
        info!(
            "Reached {} after {} transitions ({} fallbacks)",
            summary.final_state, summary.transitions, summary.fallbacks
        );
        Ok(summary)
    }

    /// Runs the active state's handler and moves to its successor.
    pub fn step(
        &self,
        model: &mut Model<'_>,
        summary: &mut RunSummary,
    ) -> Result<StateName, EngineError> {
        let state = model.current_state;
        let handler = self
            .handlers
            .get(&state)
            .ok_or(EngineError::MissingHandler(state))?;

        model.fallback = self.graph.fallback(state);
        model.next_state = None;

        let mut next = match handler.on_enter(model) {
            Outcome::Success(next) => {
                if !self.graph.is_legal(state, next) {
                    error!("Handler for {} asked for illegal successor {}", state, next);
                    return Err(EngineError::InvalidTransition {
                        from: state,
                        to: next,
                    });
                }
                next
            }
            Outcome::Failure(reason) => match self.graph.fallback(state) {
                Some(fallback) => {
                    warn!("State {} failed: {}", state, reason);
                    model.say(format!(
                        "State {} failed, falling back to {}",
                        state, fallback
                    ));
                    summary.fallbacks += 1;
                    fallback
                }
                None => {
                    error!("Safe state {} failed: {}", state, reason);
                    model.say(format!("Safe state {} failed: {}", state, reason));
                    return Err(EngineError::SafeStateFailure { state, reason });
                }
            },
        };

        if !self.graph.on_shutdown_path(next) {
            if let Some(reason) = self.abort_reason(model) {
                let safe = self.graph.safe_state();
                warn!("{}, heading to {} instead of {}", reason, safe, next);
                model.say(format!("{}, heading to {}", reason, safe));
                next = safe;
            }
        }

        handler.on_exit(model);
        info!("Transition {} -> {}", state, next);
        model.current_state = next;
        model.next_state = None;
        summary.transitions += 1;
        summary.visited.push(next);
        Ok(next)
    }

    fn abort_reason(&self, model: &Model<'_>) -> Option<&'static str> {
        if self.stop.is_raised() {
            Some("Stop requested")
        } else if !model.observatory.is_weather_safe() {
            Some("Weather is unsafe")
        } else {
            None
        }
    }
}
