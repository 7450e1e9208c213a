use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use grow_common::{
    ports::{RecordingTasks, GROW_ACTIVE_KEY, GROW_SETTINGS_NAMESPACE},
    ControlClock, ControlDecision, ControlSet, DoserActuator, GrowConfig, GrowCycleOrchestrator,
    MemoryStore, SensorKind, SensorSettings, SettingsStore, SettingsUpdate, NUM_CHECKS,
};

#[derive(Clone, Default)]
struct SharedPump {
    activated: Arc<AtomicBool>,
    hibernations: Arc<AtomicUsize>,
}

impl DoserActuator for SharedPump {
    fn name(&self) -> &str {
        "pump"
    }

    fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    fn hibernate(&mut self) {
        self.hibernations.fetch_add(1, Ordering::SeqCst);
    }

    fn clear_activated(&mut self) {
        self.activated.store(false, Ordering::SeqCst);
    }
}

fn boot(
    store: MemoryStore,
    pump: &SharedPump,
) -> (GrowCycleOrchestrator<MemoryStore, RecordingTasks>, ControlSet) {
    let config = GrowConfig::default();
    let mut controls = ControlSet::new(config.sample_period_ms);
    let dosers: Vec<Box<dyn DoserActuator + Send>> = vec![Box::new(pump.clone())];
    let mut grow = GrowCycleOrchestrator::new(store, RecordingTasks::new(), dosers, &config);
    grow.init(&mut controls).unwrap();
    (grow, controls)
}

fn ph_update() -> SettingsUpdate {
    SettingsUpdate {
        ph: Some(SensorSettings {
            enabled: true,
            target_value: 6.0,
            ..SensorSettings::default_for(SensorKind::Ph)
        }),
        ..SettingsUpdate::default()
    }
}

struct FixedClock(u64);

impl ControlClock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0
    }

    fn is_daytime(&self) -> bool {
        true
    }
}

#[test]
fn persisted_active_cycle_resumes_after_reboot() {
    let pump = SharedPump::default();
    let (mut grow, mut controls) = boot(MemoryStore::new(), &pump);
    assert!(grow.tasks().all_suspended());

    grow.apply_settings_update(&mut controls, &ph_update())
        .unwrap();
    assert!(grow.start_grow_cycle().unwrap());
    let store = grow.store().clone();

    let (rebooted, controls) = boot(store, &pump);

    assert!(rebooted.status().grow_active);
    assert!(rebooted.tasks().all_running());
    assert!(controls.get(SensorKind::Ph).is_enabled());
}

#[test]
fn persisted_stopped_cycle_stays_suspended_with_pump_parked() {
    let pump = SharedPump::default();
    let (mut grow, mut controls) = boot(MemoryStore::new(), &pump);
    grow.apply_settings_update(&mut controls, &ph_update())
        .unwrap();
    grow.start_grow_cycle().unwrap();

    pump.activated.store(true, Ordering::SeqCst);
    grow.stop_grow_cycle().unwrap();
    assert_eq!(pump.hibernations.load(Ordering::SeqCst), 1);

    pump.activated.store(true, Ordering::SeqCst);
    let (rebooted, _) = boot(grow.store().clone(), &pump);

    assert!(!rebooted.status().grow_active);
    assert!(rebooted.tasks().all_suspended());
    assert_eq!(pump.hibernations.load(Ordering::SeqCst), 2);
    assert!(!pump.activated.load(Ordering::SeqCst));
}

#[test]
fn repeated_stop_leaves_identical_state() {
    let pump = SharedPump::default();
    let (mut once, mut controls) = boot(MemoryStore::new(), &pump);
    once.apply_settings_update(&mut controls, &ph_update())
        .unwrap();
    once.start_grow_cycle().unwrap();
    let mut twice = GrowCycleOrchestrator::new(
        once.store().clone(),
        once.tasks().clone(),
        Vec::new(),
        &GrowConfig::default(),
    );
    twice.settings_received_event().unwrap();

    once.stop_grow_cycle().unwrap();
    twice.stop_grow_cycle().unwrap();
    twice.stop_grow_cycle().unwrap();

    assert_eq!(
        once.store().get_bool(GROW_SETTINGS_NAMESPACE, GROW_ACTIVE_KEY),
        twice.store().get_bool(GROW_SETTINGS_NAMESPACE, GROW_ACTIVE_KEY)
    );
    assert_eq!(once.status(), twice.status());
    assert!(once.tasks().all_suspended());
    assert!(twice.tasks().all_suspended());
}

#[test]
fn start_without_settings_issues_no_resume() {
    let pump = SharedPump::default();
    let (mut grow, _) = boot(MemoryStore::new(), &pump);
    let calls_after_boot = grow.tasks().calls().len();

    assert!(!grow.start_grow_cycle().unwrap());

    assert!(!grow.status().grow_active);
    assert_eq!(grow.tasks().calls().len(), calls_after_boot);
}

#[test]
fn applied_settings_drive_the_control() {
    let pump = SharedPump::default();
    let (mut grow, mut controls) = boot(MemoryStore::new(), &pump);
    grow.apply_settings_update(&mut controls, &ph_update())
        .unwrap();

    let clock = FixedClock(0);
    let ph = controls.get_mut(SensorKind::Ph);
    let decisions: Vec<_> = (0..NUM_CHECKS).map(|_| ph.check(7.0, &clock)).collect();

    assert_eq!(decisions.last(), Some(&ControlDecision::RequestRaise));
    assert!(ph.is_active());
}
