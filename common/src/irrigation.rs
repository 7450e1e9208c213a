use tracing::info;

use crate::{config::IrrigationSettings, timer::Timer};

/// Water pump cycling between fixed on and off intervals.
#[derive(Debug, Clone)]
pub struct IrrigationCycle {
    on_ms: u64,
    off_ms: u64,
    running: bool,
    pump_on: bool,
    timer: Timer,
}

impl IrrigationCycle {
    pub fn new(settings: IrrigationSettings) -> Self {
        let mut cycle = Self {
            on_ms: 0,
            off_ms: 0,
            running: false,
            pump_on: false,
            timer: Timer::new(),
        };
        cycle.set_intervals(settings);
        cycle
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_pump_on(&self) -> bool {
        self.pump_on
    }

    /// Starts with the pump on. A zero on-interval keeps the pump off.
    pub fn start(&mut self, now_ms: u64) -> bool {
        self.running = true;
        self.enter(self.on_ms > 0, now_ms);
        self.pump_on
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.pump_on = false;
        self.timer.disarm();
    }

    /// Advances the cycle. Returns the new pump state when it changes.
    pub fn tick(&mut self, now_ms: u64) -> Option<bool> {
        if !self.running || !self.timer.take_expired(now_ms) {
            return None;
        }

        let next = match (self.pump_on, self.on_ms, self.off_ms) {
            (_, 0, _) => false,
            (_, _, 0) => true,
            (on, _, _) => !on,
        };
        let changed = next != self.pump_on;
        self.enter(next, now_ms);
        changed.then_some(next)
    }

    /// Applies new intervals. A running cycle restarts its current phase
    /// from `now_ms` with the new length.
    pub fn update_timings(&mut self, settings: IrrigationSettings, now_ms: u64) {
        self.set_intervals(settings);
        info!(
            "irrigation: on {} s, off {} s",
            settings.on_interval_s, settings.off_interval_s
        );
        if self.running {
            self.enter(self.pump_on, now_ms);
        }
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.timer.remaining_ms(now_ms)
    }

    fn set_intervals(&mut self, settings: IrrigationSettings) {
        self.on_ms = u64::from(settings.on_interval_s) * 1_000;
        self.off_ms = u64::from(settings.off_interval_s) * 1_000;
    }

    fn enter(&mut self, pump_on: bool, now_ms: u64) {
        self.pump_on = pump_on;
        let duration_ms = if pump_on { self.on_ms } else { self.off_ms };
        if duration_ms == 0 {
            self.timer.disarm();
        } else {
            self.timer.arm(now_ms, duration_ms);
        }
    }
}
