//! Per-sensor threshold control.
//!
//! A [`SensorControl`] turns a stream of readings into corrective requests.
//! A request is only raised after [`NUM_CHECKS`] consecutive samples outside
//! `target ± margin`. Doser controls then stay committed while their dose and
//! cooldown timers run:
//!
//! ```text
//! Idle ─out─▶ Debouncing ─NUM_CHECKS─▶ Triggered ─start_dose─▶ Dosing
//!  ▲  ◀──in───┘                                                  │
//!  └──────────────── Cooling ◀──────────start_wait───────────────┘
//! ```
//!
//! Non-doser controls never stay committed; every sample is evaluated on
//! its own and the caller drives its actuator directly from the decision.

use tracing::{debug, info, warn};

use crate::{
    config::SensorSettings,
    ports::ControlClock,
    timer::{secs_to_ms, Timer},
    types::{ControlPhase, ControlStatus, SensorKind},
};

/// Consecutive out-of-band samples required before a request is raised.
pub const NUM_CHECKS: u32 = 5;

pub const DEFAULT_SAMPLE_PERIOD_MS: u64 = 2_000;

/// Outcome of one sample. The request names the side of the band the
/// reading left: `RequestLower` for readings under the band,
/// `RequestRaise` for readings over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlDecision {
    NoAction,
    RequestLower,
    RequestRaise,
}

impl ControlDecision {
    pub fn signum(self) -> i8 {
        match self {
            Self::NoAction => 0,
            Self::RequestLower => -1,
            Self::RequestRaise => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSettings {
    pub enabled: bool,
    pub target_value: f32,
    pub margin_error: f32,
    pub night_target_value: f32,
    pub day_night_active: bool,
}

#[derive(Debug, Clone)]
pub struct SensorControl {
    name: String,

    enabled: bool,
    target_value: f32,
    night_target_value: f32,
    day_night_active: bool,
    margin_error: f32,

    is_doser: bool,
    dose_time_s: f32,
    wait_time_s: f32,
    dose_percentage: f32,
    sample_period_ms: u64,

    active: bool,
    consecutive_out_of_range_count: u32,
    dose_timer: Timer,
    wait_timer: Timer,
    // A dose or cooldown has been armed since the last trigger.
    cycle_armed: bool,

    alarm_min: Option<f32>,
    alarm_max: Option<f32>,
    alarm: bool,
}

impl SensorControl {
    pub fn new(name: impl Into<String>, settings: ControlSettings) -> Self {
        let mut control = Self {
            name: name.into(),
            enabled: false,
            target_value: 0.0,
            night_target_value: 0.0,
            day_night_active: false,
            margin_error: 0.0,
            is_doser: false,
            dose_time_s: 0.0,
            wait_time_s: 0.0,
            dose_percentage: 1.0,
            sample_period_ms: DEFAULT_SAMPLE_PERIOD_MS,
            active: false,
            consecutive_out_of_range_count: 0,
            dose_timer: Timer::new(),
            wait_timer: Timer::new(),
            cycle_armed: false,
            alarm_min: None,
            alarm_max: None,
            alarm: false,
        };
        control.init(settings);
        control
    }

    /// Applies new control settings and clears all runtime state. Doser mode
    /// and dosing parameters are left as they are.
    pub fn init(&mut self, settings: ControlSettings) {
        self.enabled = settings.enabled;
        self.target_value = settings.target_value;
        self.margin_error = settings.margin_error;
        self.night_target_value = settings.night_target_value;
        self.day_night_active = settings.day_night_active;
        self.reset_runtime();
        info!("{}: control initialized", self.name);
    }

    pub fn init_doser(&mut self, dose_time_s: f32, wait_time_s: f32) {
        self.is_doser = true;
        self.dose_time_s = dose_time_s;
        self.wait_time_s = wait_time_s;
        self.dose_percentage = 1.0;
    }

    /// Out-of-bounds alarm limits. Tracked on every finite reading, also
    /// while the control is disabled.
    pub fn set_alarm_bounds(&mut self, min: Option<f32>, max: Option<f32>) {
        self.alarm_min = min;
        self.alarm_max = max;
        self.alarm = false;
    }

    pub fn is_alarm(&self) -> bool {
        self.alarm
    }

    pub fn set_sample_period_ms(&mut self, sample_period_ms: u64) {
        self.sample_period_ms = sample_period_ms;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_doser(&self) -> bool {
        self.is_doser
    }

    pub fn consecutive_out_of_range_count(&self) -> u32 {
        self.consecutive_out_of_range_count
    }

    pub fn margin_error(&self) -> f32 {
        self.margin_error
    }

    pub fn dose_percentage(&self) -> f32 {
        self.dose_percentage
    }

    pub fn dose_timer(&self) -> &Timer {
        &self.dose_timer
    }

    pub fn wait_timer(&self) -> &Timer {
        &self.wait_timer
    }

    pub fn dose_timer_mut(&mut self) -> &mut Timer {
        &mut self.dose_timer
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        info!("{}: enabled", self.name);
    }

    /// Stops the control from any state. Only software state is cleared;
    /// parking the physical actuator is up to the caller.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.reset_runtime();
        info!("{}: disabled", self.name);
    }

    pub fn resolve_target(&self, clock: &impl ControlClock) -> f32 {
        if self.day_night_active && !clock.is_daytime() {
            self.night_target_value
        } else {
            self.target_value
        }
    }

    pub fn check(&mut self, reading: f32, clock: &impl ControlClock) -> ControlDecision {
        if reading.is_finite() {
            self.track_alarm(reading);
        }

        if !self.enabled {
            return ControlDecision::NoAction;
        }

        if !reading.is_finite() {
            warn!("{}: ignoring non-finite reading", self.name);
            return ControlDecision::NoAction;
        }

        let now_ms = clock.now_ms();
        if self.active && self.is_doser {
            let dosing = self.dose_timer.is_active(now_ms);
            let cooling = self.wait_timer.is_active(now_ms);
            if dosing || cooling {
                return ControlDecision::NoAction;
            }
            if self.cycle_armed {
                self.cycle_armed = false;
                self.active = false;
                info!("{}: dose cycle complete", self.name);
            }
        }

        let target = self.resolve_target(clock);
        let under = reading < target - self.margin_error;
        let over = reading > target + self.margin_error;

        let mut decision = ControlDecision::NoAction;
        if under || over {
            self.consecutive_out_of_range_count += 1;
            debug!(
                "{}: check {} of {} ({reading} vs {target}±{})",
                self.name, self.consecutive_out_of_range_count, NUM_CHECKS, self.margin_error
            );

            if self.consecutive_out_of_range_count >= NUM_CHECKS {
                self.consecutive_out_of_range_count = 0;
                self.active = true;
                decision = if under {
                    ControlDecision::RequestLower
                } else {
                    ControlDecision::RequestRaise
                };
                info!("{}: triggered {decision:?} at {reading}", self.name);
            }
        } else if self.consecutive_out_of_range_count > 0 {
            self.consecutive_out_of_range_count = 0;
            if self.is_doser {
                self.active = false;
            }
            debug!("{}: back within margin, checks reset", self.name);
        }

        if !self.is_doser {
            self.active = false;
        }

        decision
    }

    /// Arms the dose timer for `dose_time * dose_percentage`.
    pub fn start_dose(&mut self, clock: &impl ControlClock) {
        let duration_ms = self.dose_duration_ms();
        self.dose_timer.arm(clock.now_ms(), duration_ms);
        self.cycle_armed = true;
        info!("{}: dosing for {duration_ms} ms", self.name);
    }

    /// Arms the cooldown, minus the debounce time already spent detecting
    /// the excursion.
    pub fn start_wait(&mut self, clock: &impl ControlClock) {
        let duration_ms = self.wait_duration_ms();
        self.wait_timer.arm(clock.now_ms(), duration_ms);
        self.cycle_armed = true;
        info!("{}: waiting {duration_ms} ms before next check", self.name);
    }

    pub fn set_dose_percentage(&mut self, percentage: f32) {
        if !percentage.is_finite() {
            warn!("{}: ignoring non-finite dose percentage", self.name);
            return;
        }
        self.dose_percentage = percentage.clamp(0.0, 1.0);
    }

    pub fn dose_duration_ms(&self) -> u64 {
        secs_to_ms(self.dose_time_s * self.dose_percentage)
    }

    pub fn wait_duration_ms(&self) -> u64 {
        let debounce_ms = u64::from(NUM_CHECKS).saturating_mul(self.sample_period_ms);
        secs_to_ms(self.wait_time_s).saturating_sub(debounce_ms)
    }

    pub fn phase(&self, now_ms: u64) -> ControlPhase {
        if !self.enabled {
            return ControlPhase::Disabled;
        }
        if self.is_doser && self.active {
            if self.dose_timer.remaining_ms(now_ms) > 0 {
                return ControlPhase::Dosing;
            }
            if self.wait_timer.remaining_ms(now_ms) > 0 {
                return ControlPhase::Cooling;
            }
            if !self.cycle_armed {
                return ControlPhase::Triggered;
            }
        }
        if self.consecutive_out_of_range_count > 0 {
            ControlPhase::Debouncing
        } else {
            ControlPhase::Idle
        }
    }

    pub fn status(&self, clock: &impl ControlClock) -> ControlStatus {
        let now_ms = clock.now_ms();
        ControlStatus {
            name: self.name.clone(),
            enabled: self.enabled,
            active: self.active,
            is_doser: self.is_doser,
            phase: self.phase(now_ms).as_str(),
            target_value: self.resolve_target(clock),
            margin_error: self.margin_error,
            out_of_range_count: self.consecutive_out_of_range_count,
            dose_percentage: self.dose_percentage,
            dose_remaining_ms: self.dose_timer.remaining_ms(now_ms),
            wait_remaining_ms: self.wait_timer.remaining_ms(now_ms),
            alarm: self.alarm,
        }
    }

    fn track_alarm(&mut self, reading: f32) {
        let low = self.alarm_min.is_some_and(|min| reading < min);
        let high = self.alarm_max.is_some_and(|max| reading > max);
        let alarm = low || high;
        if alarm != self.alarm {
            self.alarm = alarm;
            if alarm {
                warn!("{}: alarm, reading {reading} out of bounds", self.name);
            } else {
                info!("{}: alarm cleared at {reading}", self.name);
            }
        }
    }

    fn reset_runtime(&mut self) {
        self.active = false;
        self.consecutive_out_of_range_count = 0;
        self.dose_timer.disarm();
        self.wait_timer.disarm();
        self.cycle_armed = false;
    }
}

/// The controls of one grow controller, one per monitored quantity.
#[derive(Debug, Clone)]
pub struct ControlSet {
    water_temp: SensorControl,
    ec: SensorControl,
    ph: SensorControl,
}

impl ControlSet {
    pub fn new(sample_period_ms: u64) -> Self {
        let mut set = Self {
            water_temp: Self::build(SensorKind::WaterTemp),
            ec: Self::build(SensorKind::Ec),
            ph: Self::build(SensorKind::Ph),
        };
        for kind in SensorKind::ALL {
            set.get_mut(kind).set_sample_period_ms(sample_period_ms);
        }
        set
    }

    fn build(kind: SensorKind) -> SensorControl {
        let settings = SensorSettings::default_for(kind);
        let mut control = SensorControl::new(kind.label(), settings.control_settings());
        if let Some(doser) = settings.doser {
            control.init_doser(doser.dose_time_s, doser.wait_time_s);
        }
        control
    }

    pub fn get(&self, kind: SensorKind) -> &SensorControl {
        match kind {
            SensorKind::WaterTemp => &self.water_temp,
            SensorKind::Ec => &self.ec,
            SensorKind::Ph => &self.ph,
        }
    }

    pub fn get_mut(&mut self, kind: SensorKind) -> &mut SensorControl {
        match kind {
            SensorKind::WaterTemp => &mut self.water_temp,
            SensorKind::Ec => &mut self.ec,
            SensorKind::Ph => &mut self.ph,
        }
    }

    pub fn apply_settings(&mut self, kind: SensorKind, settings: &SensorSettings) {
        let control = self.get_mut(kind);
        control.init(settings.control_settings());
        control.set_alarm_bounds(settings.alarm_min, settings.alarm_max);
        match settings.doser {
            Some(doser) if control.is_doser() => {
                control.init_doser(doser.dose_time_s, doser.wait_time_s);
            }
            Some(_) => warn!("{}: ignoring dose timings", control.name()),
            None => {}
        }
    }

    pub fn statuses(&self, clock: &impl ControlClock) -> Vec<ControlStatus> {
        SensorKind::ALL
            .into_iter()
            .map(|kind| self.get(kind).status(clock))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ports::ManualClock;

    const PERIOD_MS: u64 = 2_000;

    fn settings(target: f32, margin: f32) -> ControlSettings {
        ControlSettings {
            enabled: true,
            target_value: target,
            margin_error: margin,
            night_target_value: target,
            day_night_active: false,
        }
    }

    fn heater() -> SensorControl {
        let mut control = SensorControl::new("TEST_HEATER", settings(6.0, 1.0));
        control.set_sample_period_ms(PERIOD_MS);
        control
    }

    fn doser() -> SensorControl {
        let mut control = heater();
        control.init_doser(10.0, 30.0);
        control
    }

    fn feed(control: &mut SensorControl, clock: &ManualClock, reading: f32, n: usize) -> Vec<ControlDecision> {
        (0..n)
            .map(|_| {
                let decision = control.check(reading, clock);
                clock.advance_ms(PERIOD_MS);
                decision
            })
            .collect()
    }

    fn trigger(control: &mut SensorControl, clock: &ManualClock, reading: f32) -> ControlDecision {
        let decisions = feed(control, clock, reading, NUM_CHECKS as usize);
        *decisions.last().unwrap()
    }

    #[test]
    fn in_band_samples_never_act() {
        let clock = ManualClock::new(0);
        let mut control = doser();

        for reading in [5.0, 5.5, 6.0, 6.5, 7.0, 5.01, 6.99] {
            for _ in 0..10 {
                assert_eq!(control.check(reading, &clock), ControlDecision::NoAction);
                assert_eq!(control.consecutive_out_of_range_count(), 0);
            }
        }
        assert!(!control.is_active());
    }

    #[test]
    fn non_doser_triggers_on_fifth_sample_without_latching() {
        let clock = ManualClock::new(0);
        let mut control = heater();

        let decisions = feed(&mut control, &clock, 8.0, 5);

        assert_eq!(
            decisions,
            vec![
                ControlDecision::NoAction,
                ControlDecision::NoAction,
                ControlDecision::NoAction,
                ControlDecision::NoAction,
                ControlDecision::RequestRaise,
            ]
        );
        assert!(!control.is_active());
        assert_eq!(control.consecutive_out_of_range_count(), 0);
    }

    #[test]
    fn under_band_requests_lower() {
        let clock = ManualClock::new(0);
        let mut control = heater();

        assert_eq!(trigger(&mut control, &clock, 4.0), ControlDecision::RequestLower);
        assert_eq!(ControlDecision::RequestLower.signum(), -1);
    }

    #[test]
    fn non_doser_retriggers_every_debounce_window() {
        let clock = ManualClock::new(0);
        let mut control = heater();

        let decisions = feed(&mut control, &clock, 8.0, 10);
        let triggers = decisions
            .iter()
            .filter(|decision| **decision == ControlDecision::RequestRaise)
            .count();

        assert_eq!(triggers, 2);
    }

    #[test]
    fn in_band_sample_resets_debounce() {
        let clock = ManualClock::new(0);
        let mut control = heater();

        feed(&mut control, &clock, 8.0, 4);
        assert_eq!(control.consecutive_out_of_range_count(), 4);
        assert_eq!(control.phase(clock.now_ms()), ControlPhase::Debouncing);

        assert_eq!(control.check(6.2, &clock), ControlDecision::NoAction);
        assert_eq!(control.consecutive_out_of_range_count(), 0);
        assert_eq!(control.phase(clock.now_ms()), ControlPhase::Idle);

        let decisions = feed(&mut control, &clock, 8.0, 4);
        assert!(decisions.iter().all(|d| *d == ControlDecision::NoAction));
    }

    #[test]
    fn oscillating_samples_accumulate_and_follow_last_direction() {
        let clock = ManualClock::new(0);
        let mut control = heater();

        let readings = [8.0, 4.0, 8.0, 4.0, 8.0];
        let decisions: Vec<_> = readings
            .iter()
            .map(|reading| control.check(*reading, &clock))
            .collect();
        assert_eq!(decisions[4], ControlDecision::RequestRaise);

        let readings = [4.0, 8.0, 4.0, 8.0, 4.0];
        let last = readings
            .iter()
            .map(|reading| control.check(*reading, &clock))
            .last()
            .unwrap();
        assert_eq!(last, ControlDecision::RequestLower);
    }

    #[test]
    fn doser_ignores_samples_while_dosing() {
        let clock = ManualClock::new(0);
        let mut control = doser();

        assert_eq!(trigger(&mut control, &clock, 8.0), ControlDecision::RequestRaise);
        assert!(control.is_active());
        assert_eq!(control.phase(clock.now_ms()), ControlPhase::Triggered);

        control.start_dose(&clock);
        assert_eq!(control.dose_timer().duration_ms(), 10_000);
        assert_eq!(control.phase(clock.now_ms()), ControlPhase::Dosing);

        for reading in [8.0, 100.0, -5.0, 6.0] {
            assert_eq!(control.check(reading, &clock), ControlDecision::NoAction);
            clock.advance_ms(1_000);
        }
        assert_eq!(control.consecutive_out_of_range_count(), 0);
        assert!(control.is_active());
    }

    #[test]
    fn dose_duration_scales_with_percentage() {
        let clock = ManualClock::new(0);
        let mut control = doser();
        control.set_dose_percentage(0.25);

        trigger(&mut control, &clock, 8.0);
        control.start_dose(&clock);

        assert_eq!(control.dose_timer().duration_ms(), 2_500);
    }

    #[test]
    fn dose_percentage_is_clamped() {
        let mut control = doser();

        control.set_dose_percentage(1.7);
        assert_eq!(control.dose_percentage(), 1.0);
        control.set_dose_percentage(-0.2);
        assert_eq!(control.dose_percentage(), 0.0);
        control.set_dose_percentage(f32::NAN);
        assert_eq!(control.dose_percentage(), 0.0);
    }

    #[test]
    fn wait_timer_compensates_for_debounce() {
        let clock = ManualClock::new(0);
        let mut control = doser();

        trigger(&mut control, &clock, 8.0);
        control.start_dose(&clock);
        clock.advance_ms(10_000);
        assert!(control.dose_timer_mut().take_expired(clock.now_ms()));

        control.start_wait(&clock);
        assert_eq!(control.wait_timer().duration_ms(), 30_000 - 5 * PERIOD_MS);
        assert_eq!(control.phase(clock.now_ms()), ControlPhase::Cooling);

        clock.advance_ms(19_999);
        assert_eq!(control.check(8.0, &clock), ControlDecision::NoAction);
        assert_eq!(control.consecutive_out_of_range_count(), 0);

        clock.advance_ms(1);
        assert_eq!(control.check(8.0, &clock), ControlDecision::NoAction);
        assert_eq!(control.consecutive_out_of_range_count(), 1);
        assert!(!control.is_active());
    }

    #[test]
    fn fresh_debounce_after_cooldown_triggers_again() {
        let clock = ManualClock::new(0);
        let mut control = doser();

        trigger(&mut control, &clock, 8.0);
        control.start_dose(&clock);
        clock.advance_ms(10_000);
        control.start_wait(&clock);
        clock.advance_ms(20_000);

        assert_eq!(trigger(&mut control, &clock, 8.0), ControlDecision::RequestRaise);
        assert!(control.is_active());
    }

    #[test]
    fn wait_shorter_than_debounce_clamps_to_zero() {
        let clock = ManualClock::new(0);
        let mut control = heater();
        control.init_doser(10.0, 4.0);

        assert_eq!(control.wait_duration_ms(), 0);
        control.start_wait(&clock);
        assert_eq!(control.wait_timer().remaining_ms(clock.now_ms()), 0);
    }

    #[test]
    fn triggered_doser_without_dose_keeps_evaluating() {
        let clock = ManualClock::new(0);
        let mut control = doser();

        trigger(&mut control, &clock, 8.0);
        assert!(control.is_active());

        let decisions = feed(&mut control, &clock, 8.0, 5);
        assert_eq!(decisions[4], ControlDecision::RequestRaise);
    }

    #[test]
    fn in_band_sample_cancels_pending_doser_escalation() {
        let clock = ManualClock::new(0);
        let mut control = doser();

        trigger(&mut control, &clock, 8.0);
        feed(&mut control, &clock, 8.0, 2);
        assert!(control.is_active());

        control.check(6.0, &clock);
        assert!(!control.is_active());
        assert_eq!(control.consecutive_out_of_range_count(), 0);
    }

    #[test]
    fn disabled_control_never_mutates() {
        let clock = ManualClock::new(0);
        let mut control = doser();
        feed(&mut control, &clock, 8.0, 3);

        control.disable();
        assert_eq!(control.consecutive_out_of_range_count(), 0);

        for reading in [8.0, 4.0, 100.0, 6.0] {
            for _ in 0..10 {
                assert_eq!(control.check(reading, &clock), ControlDecision::NoAction);
                assert_eq!(control.consecutive_out_of_range_count(), 0);
            }
        }
        assert_eq!(control.phase(clock.now_ms()), ControlPhase::Disabled);
    }

    #[test]
    fn disable_mid_dose_clears_timers_and_is_idempotent() {
        let clock = ManualClock::new(0);
        let mut control = doser();
        trigger(&mut control, &clock, 8.0);
        control.start_dose(&clock);

        control.disable();
        control.disable();

        assert!(!control.is_active());
        assert_eq!(control.dose_timer().deadline_ms(), None);
        assert_eq!(control.wait_timer().deadline_ms(), None);

        control.enable();
        assert_eq!(control.phase(clock.now_ms()), ControlPhase::Idle);
        assert_eq!(control.check(8.0, &clock), ControlDecision::NoAction);
        assert_eq!(control.consecutive_out_of_range_count(), 1);
    }

    #[test]
    fn non_finite_reading_is_ignored() {
        let clock = ManualClock::new(0);
        let mut control = heater();
        feed(&mut control, &clock, 8.0, 2);

        assert_eq!(control.check(f32::NAN, &clock), ControlDecision::NoAction);
        assert_eq!(control.consecutive_out_of_range_count(), 2);
    }

    #[test]
    fn night_target_only_applies_with_day_night_active() {
        let clock = ManualClock::new(0);
        let mut control = SensorControl::new(
            "TEST",
            ControlSettings {
                enabled: true,
                target_value: 6.0,
                margin_error: 0.5,
                night_target_value: 5.0,
                day_night_active: true,
            },
        );

        assert_eq!(control.resolve_target(&clock), 6.0);
        clock.set_night(true);
        assert_eq!(control.resolve_target(&clock), 5.0);

        // 5.2 is in band at night, out of band by day.
        assert_eq!(control.check(5.2, &clock), ControlDecision::NoAction);
        assert_eq!(control.consecutive_out_of_range_count(), 0);
        clock.set_night(false);
        control.check(5.2, &clock);
        assert_eq!(control.consecutive_out_of_range_count(), 1);

        control.init(ControlSettings {
            day_night_active: false,
            ..settings(6.0, 0.5)
        });
        clock.set_night(true);
        assert_eq!(control.resolve_target(&clock), 6.0);
    }

    #[test]
    fn init_resets_runtime_but_keeps_doser_mode() {
        let clock = ManualClock::new(0);
        let mut control = doser();
        trigger(&mut control, &clock, 8.0);
        control.start_dose(&clock);

        control.init(settings(7.0, 0.5));

        assert!(control.is_doser());
        assert!(!control.is_active());
        assert_eq!(control.dose_timer().deadline_ms(), None);
        assert_eq!(control.resolve_target(&clock), 7.0);
    }

    #[test]
    fn status_reports_remaining_times() {
        let clock = ManualClock::new(0);
        let mut control = doser();
        trigger(&mut control, &clock, 8.0);
        control.start_dose(&clock);
        clock.advance_ms(4_000);

        let status = control.status(&clock);

        assert_eq!(status.phase, "DOSING");
        assert_eq!(status.dose_remaining_ms, 6_000);
        assert_eq!(status.wait_remaining_ms, 0);
        assert!(status.active);
    }

    #[test]
    fn control_set_applies_persisted_settings() {
        let mut set = ControlSet::new(PERIOD_MS);
        assert!(set.get(SensorKind::Ph).is_doser());
        assert!(set.get(SensorKind::Ec).is_doser());
        assert!(!set.get(SensorKind::WaterTemp).is_doser());
        assert!(!set.get(SensorKind::Ph).is_enabled());

        let mut ph = SensorSettings::default_for(SensorKind::Ph);
        ph.enabled = true;
        ph.target_value = 5.8;
        set.apply_settings(SensorKind::Ph, &ph);

        let clock = ManualClock::new(0);
        assert!(set.get(SensorKind::Ph).is_enabled());
        assert_eq!(set.get(SensorKind::Ph).resolve_target(&clock), 5.8);
        assert_eq!(set.statuses(&clock).len(), 3);
    }

    #[test]
    fn alarm_tracks_bounds_without_acting() {
        let mut set = ControlSet::new(PERIOD_MS);
        let mut ec = SensorSettings::default_for(SensorKind::Ec);
        ec.enabled = true;
        ec.monitoring_only = true;
        ec.alarm_min = Some(1.0);
        ec.alarm_max = Some(2.5);
        set.apply_settings(SensorKind::Ec, &ec);

        let clock = ManualClock::new(0);
        let control = set.get_mut(SensorKind::Ec);
        for _ in 0..NUM_CHECKS {
            assert_eq!(control.check(3.0, &clock), ControlDecision::NoAction);
            clock.advance_ms(PERIOD_MS);
        }
        assert!(control.is_alarm());
        assert!(!control.is_active());
        assert!(control.status(&clock).alarm);

        control.check(f32::NAN, &clock);
        assert!(control.is_alarm());

        control.check(1.6, &clock);
        assert!(!control.is_alarm());
        control.check(0.5, &clock);
        assert!(control.is_alarm());
    }
}
