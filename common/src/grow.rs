//! Grow cycle lifecycle.
//!
//! The orchestrator owns the two persisted flags that gate the cycle and the
//! handles needed to act on a transition: the task scheduler and the doser
//! actuators. Starting requires settings to have been received at least
//! once. Stopping suspends every task, waits `settle_delay` for in-flight
//! pulses to finish, and only then parks the dosers.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    config::{ConfigError, GrowConfig, SensorSettings, SettingsUpdate},
    control::ControlSet,
    ports::{
        DoserActuator, SettingsStore, StoreError, TaskController, GROW_ACTIVE_KEY,
        GROW_SETTINGS_NAMESPACE, SETTINGS_RECEIVED_KEY,
    },
    types::{GrowStatus, SensorKind, TaskId},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("invalid {sensor} settings: {source}")]
    Invalid {
        sensor: &'static str,
        #[source]
        source: ConfigError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct GrowCycleOrchestrator<S, T> {
    store: S,
    tasks: T,
    dosers: Vec<Box<dyn DoserActuator + Send>>,
    settle_delay: Duration,
    sample_period_ms: u64,
    settings_received: bool,
    grow_active: bool,
}

impl<S: SettingsStore, T: TaskController> GrowCycleOrchestrator<S, T> {
    pub fn new(
        store: S,
        tasks: T,
        dosers: Vec<Box<dyn DoserActuator + Send>>,
        config: &GrowConfig,
    ) -> Self {
        Self {
            store,
            tasks,
            dosers,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            sample_period_ms: config.sample_period_ms,
            settings_received: false,
            grow_active: false,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn tasks(&self) -> &T {
        &self.tasks
    }

    pub fn status(&self) -> GrowStatus {
        GrowStatus {
            settings_received: self.settings_received,
            grow_active: self.grow_active,
        }
    }

    /// Restores the persisted lifecycle. Without received settings the cycle
    /// is forced off and nothing else is loaded.
    pub fn init(&mut self, controls: &mut ControlSet) -> Result<(), StoreError> {
        self.settings_received = self.read_flag(SETTINGS_RECEIVED_KEY);
        self.grow_active = self.read_flag(GROW_ACTIVE_KEY);
        info!(
            "grow: restored settings_received={} grow_active={}",
            self.settings_received, self.grow_active
        );

        if !self.settings_received {
            warn!("grow: no settings received yet, holding cycle stopped");
            return self.stop_grow_cycle();
        }

        for kind in SensorKind::ALL {
            match self.store.load_sensor_settings(kind) {
                Some(settings) => controls.apply_settings(kind, &settings),
                None => info!("grow: no stored {} settings, using defaults", kind.as_str()),
            }
        }
        self.settings_received_event()?;

        if self.grow_active {
            self.start_grow_cycle().map(|_| ())
        } else {
            self.stop_grow_cycle()
        }
    }

    /// Returns `Ok(false)` without touching any task when settings have not
    /// been received.
    pub fn start_grow_cycle(&mut self) -> Result<bool, StoreError> {
        if !self.settings_received {
            warn!("grow: start refused, settings not received");
            return Ok(false);
        }

        self.grow_active = true;
        if let Err(err) = self
            .store
            .set_bool(GROW_SETTINGS_NAMESPACE, GROW_ACTIVE_KEY, true)
        {
            self.grow_active = false;
            error!("grow: failed to persist grow_active: {err}");
            return Err(err);
        }

        for task in TaskId::ALL {
            self.tasks.resume(task);
        }
        info!("grow: cycle started");
        Ok(true)
    }

    /// Tasks are suspended and dosers parked even when the flag cannot be
    /// persisted; the store error is returned afterwards.
    pub fn stop_grow_cycle(&mut self) -> Result<(), StoreError> {
        self.grow_active = false;
        let persisted = self
            .store
            .set_bool(GROW_SETTINGS_NAMESPACE, GROW_ACTIVE_KEY, false);
        if let Err(err) = &persisted {
            error!("grow: failed to persist grow_active: {err}");
        }

        for task in TaskId::ALL {
            self.tasks.suspend(task);
        }
        self.tasks.settle(self.settle_delay);

        for doser in &mut self.dosers {
            if doser.is_activated() {
                doser.hibernate();
                doser.clear_activated();
                info!("grow: parked {}", doser.name());
            }
        }
        info!("grow: cycle stopped");
        persisted
    }

    pub fn settings_received_event(&mut self) -> Result<(), StoreError> {
        let previous = std::mem::replace(&mut self.settings_received, true);
        self.store
            .set_bool(GROW_SETTINGS_NAMESPACE, SETTINGS_RECEIVED_KEY, true)
            .inspect_err(|err| {
                self.settings_received = previous;
                error!("grow: failed to persist settings_received: {err}");
            })
    }

    /// Validates, persists and applies one sensor record.
    pub fn update_sensor_settings(
        &mut self,
        controls: &mut ControlSet,
        kind: SensorKind,
        settings: &SensorSettings,
    ) -> Result<(), SettingsError> {
        validate(kind, settings)?;
        if settings.wait_shorter_than_debounce(self.sample_period_ms) {
            warn!(
                "grow: {} wait time is shorter than the debounce window, cooldown collapses to zero",
                kind.as_str()
            );
        }

        self.store.save_sensor_settings(kind, settings)?;
        controls.apply_settings(kind, settings);
        info!("grow: {} settings updated", kind.as_str());
        Ok(())
    }

    /// Applies every record in `update`, then marks settings received.
    /// Records are validated up front so a bad entry leaves nothing applied.
    pub fn apply_settings_update(
        &mut self,
        controls: &mut ControlSet,
        update: &SettingsUpdate,
    ) -> Result<usize, SettingsError> {
        for (kind, settings) in update.entries() {
            validate(kind, settings)?;
        }

        let mut applied = 0;
        for (kind, settings) in update.entries() {
            self.update_sensor_settings(controls, kind, settings)?;
            applied += 1;
        }
        if applied > 0 {
            self.settings_received_event()?;
        }
        Ok(applied)
    }

    fn read_flag(&self, key: &str) -> bool {
        self.store
            .get_bool(GROW_SETTINGS_NAMESPACE, key)
            .unwrap_or(false)
    }
}

fn validate(kind: SensorKind, settings: &SensorSettings) -> Result<(), SettingsError> {
    settings
        .validate(kind)
        .map_err(|source| SettingsError::Invalid {
            sensor: kind.as_str(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::DoserSettings,
        ports::{MemoryStore, RecordingTasks, TaskCall},
    };

    type Journal = Arc<Mutex<Vec<String>>>;

    struct JournalTasks {
        journal: Journal,
        inner: RecordingTasks,
    }

    impl TaskController for JournalTasks {
        fn suspend(&mut self, task: TaskId) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("suspend {}", task.as_str()));
            self.inner.suspend(task);
        }

        fn resume(&mut self, task: TaskId) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("resume {}", task.as_str()));
            self.inner.resume(task);
        }

        fn settle(&mut self, delay: Duration) {
            self.journal.lock().unwrap().push("settle".to_string());
            self.inner.settle(delay);
        }
    }

    struct FakeDoser {
        name: &'static str,
        activated: bool,
        journal: Journal,
    }

    impl DoserActuator for FakeDoser {
        fn name(&self) -> &str {
            self.name
        }

        fn is_activated(&self) -> bool {
            self.activated
        }

        fn hibernate(&mut self) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("hibernate {}", self.name));
        }

        fn clear_activated(&mut self) {
            self.activated = false;
        }
    }

    fn orchestrator(
        store: MemoryStore,
        ph_activated: bool,
    ) -> (GrowCycleOrchestrator<MemoryStore, JournalTasks>, Journal) {
        let journal = Journal::default();
        let tasks = JournalTasks {
            journal: journal.clone(),
            inner: RecordingTasks::new(),
        };
        let dosers: Vec<Box<dyn DoserActuator + Send>> = vec![
            Box::new(FakeDoser {
                name: "ph_pump",
                activated: ph_activated,
                journal: journal.clone(),
            }),
            Box::new(FakeDoser {
                name: "ec_pump",
                activated: false,
                journal: journal.clone(),
            }),
        ];
        let config = GrowConfig::default();
        (
            GrowCycleOrchestrator::new(store, tasks, dosers, &config),
            journal,
        )
    }

    fn received_store(grow_active: bool) -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .set_bool(GROW_SETTINGS_NAMESPACE, SETTINGS_RECEIVED_KEY, true)
            .unwrap();
        store
            .set_bool(GROW_SETTINGS_NAMESPACE, GROW_ACTIVE_KEY, grow_active)
            .unwrap();
        store
    }

    #[test]
    fn init_without_settings_forces_stop() {
        let (mut grow, _) = orchestrator(MemoryStore::new(), false);
        let mut controls = ControlSet::new(2_000);

        grow.init(&mut controls).unwrap();

        assert_eq!(
            grow.status(),
            GrowStatus {
                settings_received: false,
                grow_active: false
            }
        );
        assert!(grow.tasks().inner.all_suspended());
        assert_eq!(
            grow.store().get_bool(GROW_SETTINGS_NAMESPACE, GROW_ACTIVE_KEY),
            Some(false)
        );
    }

    #[test]
    fn start_refused_until_settings_received() {
        let (mut grow, journal) = orchestrator(MemoryStore::new(), false);

        assert_eq!(grow.start_grow_cycle(), Ok(false));
        assert!(!grow.status().grow_active);
        assert!(journal.lock().unwrap().is_empty());
        assert_eq!(grow.store().write_count(), 0);

        grow.settings_received_event().unwrap();
        assert_eq!(grow.start_grow_cycle(), Ok(true));
        assert!(grow.tasks().inner.all_running());
    }

    #[test]
    fn stop_suspends_before_parking_dosers() {
        let (mut grow, journal) = orchestrator(received_store(true), true);

        grow.stop_grow_cycle().unwrap();

        let journal = journal.lock().unwrap();
        let settle = journal.iter().position(|e| e == "settle").unwrap();
        let park = journal
            .iter()
            .position(|e| e == "hibernate ph_pump")
            .unwrap();
        let suspends = journal
            .iter()
            .filter(|e| e.starts_with("suspend "))
            .count();

        assert_eq!(suspends, TaskId::ALL.len());
        assert_eq!(settle, TaskId::ALL.len());
        assert!(settle < park);
        assert!(!journal.iter().any(|e| e == "hibernate ec_pump"));
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut grow, journal) = orchestrator(received_store(true), true);

        grow.stop_grow_cycle().unwrap();
        let first: Vec<TaskCall> = grow.tasks().inner.calls().to_vec();
        let parked_once = journal.lock().unwrap().len();

        grow.stop_grow_cycle().unwrap();

        assert!(grow.tasks().inner.all_suspended());
        assert_eq!(grow.tasks().inner.calls().len(), first.len() * 2);
        assert_eq!(
            grow.store().get_bool(GROW_SETTINGS_NAMESPACE, GROW_ACTIVE_KEY),
            Some(false)
        );
        // The doser was cleared by the first stop, so nothing is parked again.
        assert_eq!(journal.lock().unwrap().len(), parked_once * 2 - 1);
    }

    #[test]
    fn stop_parks_even_when_persisting_fails() {
        let mut store = received_store(true);
        store.fail_writes(true);
        let (mut grow, journal) = orchestrator(store, true);

        assert_eq!(grow.stop_grow_cycle(), Err(StoreError::Full));

        assert!(!grow.status().grow_active);
        assert!(journal
            .lock()
            .unwrap()
            .iter()
            .any(|e| e == "hibernate ph_pump"));
    }

    #[test]
    fn settings_received_reverts_when_persisting_fails() {
        let (mut grow, journal) = orchestrator(MemoryStore::new(), false);
        grow.store_mut().fail_writes(true);

        assert_eq!(grow.settings_received_event(), Err(StoreError::Full));
        assert!(!grow.status().settings_received);

        grow.store_mut().fail_writes(false);
        assert_eq!(grow.start_grow_cycle(), Ok(false));
        assert!(journal.lock().unwrap().is_empty());
    }

    #[test]
    fn start_reverts_flag_when_persisting_fails() {
        let (mut grow, journal) = orchestrator(MemoryStore::new(), false);
        grow.settings_received_event().unwrap();
        grow.store_mut().fail_writes(true);

        assert_eq!(grow.start_grow_cycle(), Err(StoreError::Full));
        assert!(!grow.status().grow_active);
        assert!(journal.lock().unwrap().is_empty());
    }

    #[test]
    fn init_restores_running_cycle_and_settings() {
        let mut store = received_store(true);
        let mut ph = SensorSettings::default_for(SensorKind::Ph);
        ph.enabled = true;
        ph.target_value = 5.5;
        store.save_sensor_settings(SensorKind::Ph, &ph).unwrap();
        let (mut grow, _) = orchestrator(store, false);
        let mut controls = ControlSet::new(2_000);

        grow.init(&mut controls).unwrap();

        assert!(grow.status().grow_active);
        assert!(grow.tasks().inner.all_running());
        assert!(controls.get(SensorKind::Ph).is_enabled());
        assert!(!controls.get(SensorKind::Ec).is_enabled());
    }

    #[test]
    fn update_rejects_invalid_record_without_persisting() {
        let (mut grow, _) = orchestrator(MemoryStore::new(), false);
        let mut controls = ControlSet::new(2_000);
        let mut ph = SensorSettings::default_for(SensorKind::Ph);
        ph.margin_error = -1.0;

        let err = grow
            .update_sensor_settings(&mut controls, SensorKind::Ph, &ph)
            .unwrap_err();

        assert!(matches!(err, SettingsError::Invalid { sensor: "ph", .. }));
        assert!(grow.store().load_sensor_settings(SensorKind::Ph).is_none());
    }

    #[test]
    fn settings_update_applies_and_marks_received() {
        let (mut grow, _) = orchestrator(MemoryStore::new(), false);
        let mut controls = ControlSet::new(2_000);
        let update = SettingsUpdate {
            ec: Some(SensorSettings {
                enabled: true,
                doser: Some(DoserSettings {
                    dose_time_s: 5.0,
                    wait_time_s: 60.0,
                }),
                ..SensorSettings::default_for(SensorKind::Ec)
            }),
            ..SettingsUpdate::default()
        };

        assert_eq!(grow.apply_settings_update(&mut controls, &update), Ok(1));

        assert!(grow.status().settings_received);
        assert!(controls.get(SensorKind::Ec).is_enabled());
        assert_eq!(controls.get(SensorKind::Ec).dose_duration_ms(), 5_000);
        assert_eq!(
            grow.store().load_sensor_settings(SensorKind::Ec),
            update.ec.clone()
        );
    }

    #[test]
    fn empty_update_does_not_mark_received() {
        let (mut grow, _) = orchestrator(MemoryStore::new(), false);
        let mut controls = ControlSet::new(2_000);

        assert_eq!(
            grow.apply_settings_update(&mut controls, &SettingsUpdate::default()),
            Ok(0)
        );
        assert!(!grow.status().settings_received);
    }
}
