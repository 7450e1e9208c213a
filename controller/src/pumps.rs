//! Actuators driven by the control decisions.
//!
//! There is no pump hardware on the host build. Pumps and the heater keep
//! their state in memory and log transitions; the simulator reads that state
//! back to close the loop.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use grow_common::{
    ControlClock, ControlDecision, DoserActuator, SensorControl, SensorKind,
};

/// Share of the full dose given for a reading `reading` against `target`.
/// Readings right at the margin get a quarter dose, readings four margins
/// out or further get the full dose.
pub fn dose_fraction(reading: f32, target: f32, margin: f32) -> f32 {
    if !reading.is_finite() || !target.is_finite() || margin <= 0.0 {
        return 1.0;
    }
    ((reading - target).abs() / (4.0 * margin)).clamp(0.25, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpSide {
    /// Pushes the reading up.
    Up,
    /// Pushes the reading down.
    Down,
}

#[derive(Debug)]
pub struct DosingPump {
    name: &'static str,
    running: bool,
    hibernating: bool,
    doses: u64,
}

impl DosingPump {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: false,
            hibernating: false,
            doses: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_hibernating(&self) -> bool {
        self.hibernating
    }

    pub fn doses(&self) -> u64 {
        self.doses
    }

    fn start(&mut self) {
        self.hibernating = false;
        self.running = true;
        self.doses += 1;
        info!("{}: on", self.name);
    }

    fn stop(&mut self) {
        if self.running {
            self.running = false;
            info!("{}: off", self.name);
        }
    }

    fn hibernate(&mut self) {
        self.stop();
        self.hibernating = true;
        info!("{}: hibernating", self.name);
    }
}

/// Pumps serving one doser control, plus the bookkeeping of the dose cycle
/// currently in flight.
#[derive(Debug)]
pub struct DoserModule {
    sensor: SensorKind,
    up: Option<DosingPump>,
    down: Option<DosingPump>,
    dosing: Option<PumpSide>,
    // Parked mid-dose; the cooldown still follows once the dose timer runs out.
    cooldown_owed: bool,
    activated: bool,
}

impl DoserModule {
    pub fn new(sensor: SensorKind, up: Option<DosingPump>, down: Option<DosingPump>) -> Self {
        Self {
            sensor,
            up,
            down,
            dosing: None,
            cooldown_owed: false,
            activated: false,
        }
    }

    /// pH can be corrected both ways.
    pub fn ph() -> Self {
        Self::new(
            SensorKind::Ph,
            Some(DosingPump::new("ph_up_pump")),
            Some(DosingPump::new("ph_down_pump")),
        )
    }

    /// EC can only be raised by adding nutrient solution.
    pub fn ec() -> Self {
        Self::new(SensorKind::Ec, Some(DosingPump::new("nutrient_pump")), None)
    }

    pub fn sensor(&self) -> SensorKind {
        self.sensor
    }

    pub fn dosing(&self) -> Option<PumpSide> {
        self.dosing
    }

    pub fn pump(&self, side: PumpSide) -> Option<&DosingPump> {
        match side {
            PumpSide::Up => self.up.as_ref(),
            PumpSide::Down => self.down.as_ref(),
        }
    }

    fn pump_mut(&mut self, side: PumpSide) -> Option<&mut DosingPump> {
        match side {
            PumpSide::Up => self.up.as_mut(),
            PumpSide::Down => self.down.as_mut(),
        }
    }

    /// Moves an in-flight cycle forward: ends the dose once its timer has
    /// expired and starts the cooldown, then drops the activated flag once
    /// the control has left its cycle.
    pub fn service(&mut self, control: &mut SensorControl, clock: &impl ControlClock) {
        if let Some(side) = self.dosing {
            let expired = control.dose_timer_mut().take_expired(clock.now_ms());
            // A disarmed timer means the control was reset mid-dose.
            let cancelled = !expired && control.dose_timer().deadline_ms().is_none();
            if expired || cancelled {
                if let Some(pump) = self.pump_mut(side) {
                    pump.stop();
                }
                self.dosing = None;
            }
            if expired {
                control.start_wait(clock);
            }
        } else if self.cooldown_owed {
            let expired = control.dose_timer_mut().take_expired(clock.now_ms());
            if expired {
                info!("{}: dose interrupted by a stop, cooling down", control.name());
                self.activated = true;
                control.start_wait(clock);
            }
            if expired || control.dose_timer().deadline_ms().is_none() {
                self.cooldown_owed = false;
            }
        }

        if self.activated && self.dosing.is_none() && !control.is_active() {
            self.activated = false;
        }
    }

    /// Starts a dose for a triggered decision. Returns the side dosed.
    pub fn handle(
        &mut self,
        control: &mut SensorControl,
        decision: ControlDecision,
        reading: f32,
        clock: &impl ControlClock,
    ) -> Option<PumpSide> {
        let side = match decision {
            ControlDecision::NoAction => return None,
            ControlDecision::RequestLower => PumpSide::Up,
            ControlDecision::RequestRaise => PumpSide::Down,
        };
        if self.dosing.is_some() {
            return None;
        }

        let fraction = dose_fraction(reading, control.resolve_target(clock), control.margin_error());
        let Some(pump) = self.pump_mut(side) else {
            warn!(
                "{}: no pump can move the reading {side:?}, starting cooldown only",
                control.name()
            );
            self.activated = true;
            control.start_wait(clock);
            return None;
        };

        pump.start();
        self.dosing = Some(side);
        self.cooldown_owed = false;
        self.activated = true;
        control.set_dose_percentage(fraction);
        control.start_dose(clock);
        Some(side)
    }
}

impl DoserActuator for DoserModule {
    fn name(&self) -> &str {
        self.sensor.as_str()
    }

    fn is_activated(&self) -> bool {
        self.activated
    }

    fn hibernate(&mut self) {
        for pump in [self.up.as_mut(), self.down.as_mut()].into_iter().flatten() {
            pump.hibernate();
        }
        if self.dosing.take().is_some() {
            self.cooldown_owed = true;
        }
    }

    fn clear_activated(&mut self) {
        self.activated = false;
    }
}

/// Handle that lets the orchestrator park a module the control task also
/// drives.
#[derive(Debug, Clone)]
pub struct SharedDoser(Arc<Mutex<DoserModule>>);

impl SharedDoser {
    pub fn new(module: DoserModule) -> Self {
        Self(Arc::new(Mutex::new(module)))
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, DoserModule> {
        // A panic while holding the lock leaves the pump flags intact.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DoserActuator for SharedDoser {
    fn name(&self) -> &str {
        match self.lock().sensor() {
            SensorKind::Ph => "ph_doser",
            SensorKind::Ec => "ec_doser",
            SensorKind::WaterTemp => "water_temp",
        }
    }

    fn is_activated(&self) -> bool {
        self.lock().is_activated()
    }

    fn hibernate(&mut self) {
        self.lock().hibernate();
    }

    fn clear_activated(&mut self) {
        self.lock().clear_activated();
    }
}

/// Continuously driven water heater.
#[derive(Debug, Default)]
pub struct Heater {
    on: bool,
}

impl Heater {
    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Readings under the band switch the heater on, readings over it
    /// switch it off. In-band samples leave it as it is.
    pub fn apply(&mut self, decision: ControlDecision) {
        let next = match decision {
            ControlDecision::NoAction => return,
            ControlDecision::RequestLower => true,
            ControlDecision::RequestRaise => false,
        };
        if next != self.on {
            self.on = next;
            info!("heater: {}", if next { "on" } else { "off" });
        }
    }

    pub fn off(&mut self) {
        self.apply(ControlDecision::RequestRaise);
    }
}
