//! Static state graph of the nightly sequence.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use super::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateName {
    Ready,
    Calibrating,
    Scheduling,
    Slewing,
    Pointing,
    Observing,
    Analyzing,
    Parking,
    Parked,
    Housekeeping,
    Sleeping,
}

impl StateName {
    pub const ALL: [StateName; 11] = [
        StateName::Ready,
        StateName::Calibrating,
        StateName::Scheduling,
        StateName::Slewing,
        StateName::Pointing,
        StateName::Observing,
        StateName::Analyzing,
        StateName::Parking,
        StateName::Parked,
        StateName::Housekeeping,
        StateName::Sleeping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateName::Ready => "ready",
            StateName::Calibrating => "calibrating",
            StateName::Scheduling => "scheduling",
            StateName::Slewing => "slewing",
            StateName::Pointing => "pointing",
            StateName::Observing => "observing",
            StateName::Analyzing => "analyzing",
            StateName::Parking => "parking",
            StateName::Parked => "parked",
            StateName::Housekeeping => "housekeeping",
            StateName::Sleeping => "sleeping",
        }
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown state: {0}")]
pub struct ParseStateNameError(pub String);

impl FromStr for StateName {
    type Err = ParseStateNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StateName::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ParseStateNameError(s.to_string()))
    }
}

/// One node of the graph: its legal successors and where it goes on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSpec {
    pub name: StateName,
    #[serde(default)]
    pub transitions: Vec<StateName>,
    #[serde(default)]
    pub fallback: Option<StateName>,
}

impl StateSpec {
    pub fn new(name: StateName, transitions: &[StateName], fallback: Option<StateName>) -> Self {
        Self {
            name,
            transitions: transitions.to_vec(),
            fallback,
        }
    }
}

/// Validated state graph.
///
/// The *shutdown path* is every state reachable from the safe state. States
/// outside it must be able to reach the safe state in one step, which is what
/// lets the engine abandon the night from anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct StateGraph {
    states: BTreeMap<StateName, StateSpec>,
    initial: StateName,
    safe: StateName,
    terminal: StateName,
    shutdown_path: BTreeSet<StateName>,
}

impl StateGraph {
    pub fn new(
        initial: StateName,
        safe: StateName,
        terminal: StateName,
        specs: Vec<StateSpec>,
    ) -> Result<Self, EngineError> {
        let mut states = BTreeMap::new();
        for spec in specs {
            let name = spec.name;
            if states.insert(name, spec).is_some() {
                return Err(EngineError::InvalidGraph(format!(
                    "state {} declared twice",
                    name
                )));
            }
        }

        let mut graph = Self {
            states,
            initial,
            safe,
            terminal,
            shutdown_path: BTreeSet::new(),
        };
        graph.validate()?;
        Ok(graph)
    }

    /// The default nightly sequence.
    pub fn nightly() -> Result<Self, EngineError> {
        Self::new(
            StateName::Ready,
            StateName::Parking,
            StateName::Sleeping,
            nightly_states(),
        )
    }

    pub fn initial(&self) -> StateName {
        self.initial
    }

    pub fn safe_state(&self) -> StateName {
        self.safe
    }

    pub fn terminal(&self) -> StateName {
        self.terminal
    }

    pub fn states(&self) -> impl Iterator<Item = &StateSpec> {
        self.states.values()
    }

    pub fn is_legal(&self, from: StateName, to: StateName) -> bool {
        self.states
            .get(&from)
            .is_some_and(|spec| spec.transitions.contains(&to))
    }

    pub fn fallback(&self, state: StateName) -> Option<StateName> {
        self.states.get(&state).and_then(|spec| spec.fallback)
    }

    pub fn is_terminal(&self, state: StateName) -> bool {
        state == self.terminal
    }

    pub fn on_shutdown_path(&self, state: StateName) -> bool {
        self.shutdown_path.contains(&state)
    }

    pub fn shutdown_path(&self) -> &BTreeSet<StateName> {
        &self.shutdown_path
    }

    /// Checks the graph and caches the shutdown path.
    fn validate(&mut self) -> Result<(), EngineError> {
        for state in [self.initial, self.safe, self.terminal] {
            if !self.states.contains_key(&state) {
                return Err(EngineError::InvalidGraph(format!(
                    "state {} is not declared",
                    state
                )));
            }
        }

        for spec in self.states.values() {
            for next in spec.transitions.iter().chain(spec.fallback.iter()) {
                if !self.states.contains_key(next) {
                    return Err(EngineError::InvalidGraph(format!(
                        "{} refers to undeclared state {}",
                        spec.name, next
                    )));
                }
            }
            if let Some(fallback) = spec.fallback {
                if !spec.transitions.contains(&fallback) {
                    return Err(EngineError::InvalidGraph(format!(
                        "fallback {} of {} is not one of its transitions",
                        fallback, spec.name
                    )));
                }
            }
            if spec.name == self.terminal {
                if !spec.transitions.is_empty() {
                    return Err(EngineError::InvalidGraph(format!(
                        "terminal state {} has transitions",
                        spec.name
                    )));
                }
            } else if spec.transitions.is_empty() {
                return Err(EngineError::InvalidGraph(format!(
                    "state {} has no way out",
                    spec.name
                )));
            }
        }

        self.shutdown_path = self.reachable_from(self.safe);

        if !self.shutdown_path.contains(&self.terminal) {
            return Err(EngineError::InvalidGraph(format!(
                "terminal state {} is not reachable from safe state {}",
                self.terminal, self.safe
            )));
        }
        if self.initial == self.terminal || self.shutdown_path.contains(&self.initial) {
            return Err(EngineError::InvalidGraph(format!(
                "initial state {} lies on the shutdown path",
                self.initial
            )));
        }

        for spec in self.states.values() {
            if !self.shutdown_path.contains(&spec.name) && !spec.transitions.contains(&self.safe) {
                return Err(EngineError::InvalidGraph(format!(
                    "state {} cannot reach safe state {}",
                    spec.name, self.safe
                )));
            }
        }

        Ok(())
    }

    fn reachable_from(&self, start: StateName) -> BTreeSet<StateName> {
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(state) = queue.pop_front() {
            let Some(spec) = self.states.get(&state) else {
                continue;
            };
            for next in &spec.transitions {
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        seen
    }
}

/// State table of the default nightly sequence.
pub fn nightly_states() -> Vec<StateSpec> {
    use StateName::*;

    vec![
        StateSpec::new(Ready, &[Calibrating, Scheduling, Parking], Some(Parking)),
        StateSpec::new(Calibrating, &[Scheduling, Parking], Some(Parking)),
        StateSpec::new(Scheduling, &[Slewing, Parking], Some(Parking)),
        StateSpec::new(Slewing, &[Pointing, Parking], Some(Parking)),
        StateSpec::new(Pointing, &[Observing, Parking], Some(Parking)),
        StateSpec::new(Observing, &[Analyzing, Parking], Some(Parking)),
        StateSpec::new(Analyzing, &[Observing, Scheduling, Parking], Some(Parking)),
        StateSpec::new(Parking, &[Parked], None),
        StateSpec::new(Parked, &[Housekeeping], Some(Housekeeping)),
        StateSpec::new(Housekeeping, &[Sleeping], Some(Sleeping)),
        StateSpec::new(Sleeping, &[], None),
    ]
}
