//! Cooperative suspension for the grow tasks.
//!
//! Each task owns a [`TaskGate`] and waits on it at the top of every
//! iteration. Closing a gate lets the current iteration finish and parks the
//! task before the next one.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use tokio::sync::watch;
use tracing::debug;

use grow_common::{ControlClock, TaskController, TaskId};

pub fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Process clock: monotonic milliseconds plus the day/night flag the
/// photoperiod task maintains.
#[derive(Debug, Clone)]
pub struct SystemClock {
    is_day: Arc<AtomicBool>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            is_day: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_daytime(&self, is_day: bool) {
        self.is_day.store(is_day, Ordering::Relaxed);
    }
}

impl ControlClock for SystemClock {
    fn now_ms(&self) -> u64 {
        monotonic_ms()
    }

    fn is_daytime(&self) -> bool {
        self.is_day.load(Ordering::Relaxed)
    }
}

/// One gate per task, all closed until the grow cycle starts.
#[derive(Debug)]
pub struct TaskGates {
    gates: BTreeMap<TaskId, watch::Sender<bool>>,
}

impl TaskGates {
    pub fn new() -> Self {
        let gates = TaskId::ALL
            .into_iter()
            .map(|task| (task, watch::Sender::new(false)))
            .collect();
        Self { gates }
    }

    pub fn gate(&self, task: TaskId) -> TaskGate {
        TaskGate {
            task,
            rx: self.sender(task).subscribe(),
        }
    }

    pub fn set_open(&self, task: TaskId, open: bool) {
        self.sender(task).send_replace(open);
    }

    pub fn is_open(&self, task: TaskId) -> bool {
        *self.sender(task).borrow()
    }

    fn sender(&self, task: TaskId) -> &watch::Sender<bool> {
        // Every TaskId gets a sender in `new`.
        &self.gates[&task]
    }
}

#[derive(Debug)]
pub struct TaskGate {
    task: TaskId,
    rx: watch::Receiver<bool>,
}

impl TaskGate {
    /// Waits until the task may run. Returns `false` once the gates are gone
    /// and the task should exit.
    pub async fn wait_open(&mut self) -> bool {
        match self.rx.wait_for(|open| *open).await {
            Ok(_) => true,
            Err(_) => {
                debug!("{}: gate closed for good", self.task.as_str());
                false
            }
        }
    }
}

/// [`TaskController`] over the gates. `settle` blocks the calling thread, so
/// it must run on the blocking pool.
#[derive(Debug, Clone)]
pub struct GateController {
    gates: Arc<TaskGates>,
}

impl GateController {
    pub fn new(gates: Arc<TaskGates>) -> Self {
        Self { gates }
    }
}

impl TaskController for GateController {
    fn suspend(&mut self, task: TaskId) {
        self.gates.set_open(task, false);
        debug!("{}: suspended", task.as_str());
    }

    fn resume(&mut self, task: TaskId) {
        self.gates.set_open(task, true);
        debug!("{}: resumed", task.as_str());
    }

    fn settle(&mut self, delay: Duration) {
        std::thread::sleep(delay);
    }
}
