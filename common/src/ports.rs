//! Boundaries between the control core and the platform it runs on.
//!
//! The clock, the persistent store, the task scheduler and the doser
//! actuators are all injected through these traits so the control and
//! lifecycle logic runs unchanged against fakes in tests.

use std::{
    cell::Cell,
    collections::{BTreeMap, BTreeSet, HashMap},
    time::Duration,
};

use thiserror::Error;

use crate::{
    config::SensorSettings,
    types::{SensorKind, TaskId},
};

pub const GROW_SETTINGS_NAMESPACE: &str = "grow_settings";
pub const SETTINGS_RECEIVED_KEY: &str = "settings_rec";
pub const GROW_ACTIVE_KEY: &str = "grow_active";

/// Monotonic time plus the process-wide day/night indicator.
pub trait ControlClock {
    fn now_ms(&self) -> u64;
    fn is_daytime(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage full")]
    Full,
    #[error("storage i/o error: {0}")]
    Io(String),
    #[error("stored record could not be encoded: {0}")]
    Encoding(String),
}

/// Durable key/value storage for flags and per-sensor control records.
pub trait SettingsStore {
    fn get_bool(&self, namespace: &str, key: &str) -> Option<bool>;

    fn set_bool(&mut self, namespace: &str, key: &str, value: bool) -> Result<(), StoreError>;

    fn load_sensor_settings(&self, kind: SensorKind) -> Option<SensorSettings>;

    fn save_sensor_settings(
        &mut self,
        kind: SensorKind,
        settings: &SensorSettings,
    ) -> Result<(), StoreError>;
}

/// Suspend/resume capability over the scheduler that runs the grow tasks.
pub trait TaskController {
    fn suspend(&mut self, task: TaskId);

    fn resume(&mut self, task: TaskId);

    /// Blocks the caller for `delay`, letting in-flight work drain.
    fn settle(&mut self, delay: Duration);
}

/// Physical actuator attached to a doser control.
pub trait DoserActuator {
    fn name(&self) -> &str;

    fn is_activated(&self) -> bool;

    /// Parks the hardware in its lowest-power safe state.
    fn hibernate(&mut self);

    fn clear_activated(&mut self);
}

/// Volatile [`SettingsStore`], used for tests and for runs without a data
/// directory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    flags: BTreeMap<(String, String), bool>,
    sensors: HashMap<SensorKind, SensorSettings>,
    fail_writes: bool,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with [`StoreError::Full`].
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn check_writable(&mut self) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Full);
        }
        self.writes += 1;
        Ok(())
    }
}

impl SettingsStore for MemoryStore {
    fn get_bool(&self, namespace: &str, key: &str) -> Option<bool> {
        self.flags
            .get(&(namespace.to_string(), key.to_string()))
            .copied()
    }

    fn set_bool(&mut self, namespace: &str, key: &str, value: bool) -> Result<(), StoreError> {
        self.check_writable()?;
        self.flags
            .insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }

    fn load_sensor_settings(&self, kind: SensorKind) -> Option<SensorSettings> {
        self.sensors.get(&kind).cloned()
    }

    fn save_sensor_settings(
        &mut self,
        kind: SensorKind,
        settings: &SensorSettings,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        self.sensors.insert(kind, settings.clone());
        Ok(())
    }
}

/// Hand-driven [`ControlClock`] for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: Cell<u64>,
    night: Cell<bool>,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: Cell::new(now_ms),
            night: Cell::new(false),
        }
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.now_ms.set(self.now_ms.get().saturating_add(delta_ms));
    }

    pub fn set_night(&self, night: bool) {
        self.night.set(night);
    }
}

impl ControlClock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    fn is_daytime(&self) -> bool {
        !self.night.get()
    }
}

/// Call made against a [`RecordingTasks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCall {
    Suspend(TaskId),
    Resume(TaskId),
    Settle(Duration),
}

/// [`TaskController`] that records calls instead of scheduling anything.
/// Every task starts suspended and `settle` returns immediately.
#[derive(Debug, Clone, Default)]
pub struct RecordingTasks {
    running: BTreeSet<TaskId>,
    calls: Vec<TaskCall>,
}

impl RecordingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, task: TaskId) -> bool {
        self.running.contains(&task)
    }

    pub fn all_running(&self) -> bool {
        TaskId::ALL.iter().all(|task| self.is_running(*task))
    }

    pub fn all_suspended(&self) -> bool {
        self.running.is_empty()
    }

    pub fn calls(&self) -> &[TaskCall] {
        &self.calls
    }
}

impl TaskController for RecordingTasks {
    fn suspend(&mut self, task: TaskId) {
        self.running.remove(&task);
        self.calls.push(TaskCall::Suspend(task));
    }

    fn resume(&mut self, task: TaskId) {
        self.running.insert(task);
        self.calls.push(TaskCall::Resume(task));
    }

    fn settle(&mut self, delay: Duration) {
        self.calls.push(TaskCall::Settle(delay));
    }
}
