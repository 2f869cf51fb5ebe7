use log::info;
use std::sync::Mutex;

use super::graph::StateName;
use crate::hardware::{ExposureRecord, Observatory};
use crate::scheduler::Scheduler;

/// Sink for operator-facing messages.
pub trait Notifier {
    fn say(&self, message: &str);
}

/// Notifier that only writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn say(&self, message: &str) {
        info!("{}", message);
    }
}

/// Notifier that keeps every message, for inspection after a run.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl Notifier for RecordingNotifier {
    fn say(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

/// Everything a handler may touch during one engine run.
pub struct Model<'a> {
    pub current_state: StateName,
    /// Successor the engine will take if the handler stops here.
    pub next_state: Option<StateName>,
    /// Where the current state goes on failure, `None` for the safe state.
    pub fallback: Option<StateName>,
    pub scheduler: &'a mut Scheduler,
    pub observatory: &'a mut dyn Observatory,
    /// Frame taken by `observing`, consumed by `analyzing`.
    pub last_exposure: Option<ExposureRecord>,
    notifier: &'a dyn Notifier,
}

impl<'a> Model<'a> {
    pub fn new(
        initial: StateName,
        scheduler: &'a mut Scheduler,
        observatory: &'a mut dyn Observatory,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            current_state: initial,
            next_state: None,
            fallback: None,
            scheduler,
            observatory,
            last_exposure: None,
            notifier,
        }
    }

    pub fn say(&self, message: impl AsRef<str>) {
        self.notifier.say(message.as_ref());
    }
}
