//! Simulated nutrient reservoir for running the controller without probes.
//!
//! Each quantity follows a slow drift plus a random walk, and responds to
//! the actuators: the pH pumps push pH, the nutrient pump raises EC and the
//! heater warms the water. Readings carry probe noise and the occasional
//! spike in the flaky scenario.

use std::fmt;

use grow_common::SensorKind;

fn approx_std_normal() -> f32 {
    let mut sum = 0.0;
    for _ in 0..12 {
        sum += fastrand::f32();
    }
    sum - 6.0
}

fn gaussian(mean: f32, sigma: f32) -> f32 {
    mean + sigma * approx_std_normal()
}

/// Simulation profile selected through `SIM_SCENARIO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// pH creeps up, EC is taken up by the plants, water cools toward room
    /// temperature. Every control eventually has something to do.
    Drifting,
    /// Quantities hover near typical set points with little noise.
    Stable,
    /// Drifting, with loud probe noise and frequent spikes.
    Flaky,
}

impl Scenario {
    pub fn from_str_lossy(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "flaky" => Self::Flaky,
            _ => Self::Drifting,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drifting => write!(f, "drifting"),
            Self::Stable => write!(f, "stable"),
            Self::Flaky => write!(f, "flaky"),
        }
    }
}

/// Actuator state fed back into the simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Actuation {
    pub ph_up: bool,
    pub ph_down: bool,
    pub nutrient: bool,
    pub heater: bool,
}

struct Channel {
    value: f32,
    drift: f32,
    walk_sigma: f32,
    noise_sigma: f32,
    min: f32,
    max: f32,
}

impl Channel {
    fn evolve(&mut self, push: f32) {
        self.value = (self.value + self.drift + push + gaussian(0.0, self.walk_sigma))
            .clamp(self.min, self.max);
    }
}

pub struct ReservoirSim {
    water_temp: Channel,
    ec: Channel,
    ph: Channel,
    ambient_temp: f32,
    spike_prob: f32,
    actuation: Actuation,
}

impl ReservoirSim {
    pub fn new(scenario: Scenario) -> Self {
        let (scale, spike_prob) = match scenario {
            Scenario::Drifting => (1.0, 0.0),
            Scenario::Stable => (0.1, 0.0),
            Scenario::Flaky => (1.0, 0.08),
        };
        let noise = if scenario == Scenario::Flaky { 4.0 } else { 1.0 };

        Self {
            water_temp: Channel {
                value: 21.0,
                drift: 0.0,
                walk_sigma: 0.01 * scale,
                noise_sigma: 0.05 * noise,
                min: 5.0,
                max: 40.0,
            },
            ec: Channel {
                value: 1.6,
                drift: -0.002 * scale,
                walk_sigma: 0.002 * scale,
                noise_sigma: 0.01 * noise,
                min: 0.0,
                max: 5.0,
            },
            ph: Channel {
                value: 6.0,
                drift: 0.003 * scale,
                walk_sigma: 0.003 * scale,
                noise_sigma: 0.02 * noise,
                min: 2.0,
                max: 11.0,
            },
            ambient_temp: 19.0,
            spike_prob,
            actuation: Actuation::default(),
        }
    }

    pub fn set_actuation(&mut self, actuation: Actuation) {
        self.actuation = actuation;
    }

    pub fn true_value(&self, kind: SensorKind) -> f32 {
        match kind {
            SensorKind::WaterTemp => self.water_temp.value,
            SensorKind::Ec => self.ec.value,
            SensorKind::Ph => self.ph.value,
        }
    }

    /// Advances one channel by a sample period and returns a noisy probe
    /// reading.
    pub fn sample(&mut self, kind: SensorKind) -> f32 {
        let act = self.actuation;
        let ambient_pull = 0.01 * (self.ambient_temp - self.water_temp.value);
        let channel = match kind {
            SensorKind::WaterTemp => {
                let heat = if act.heater { 0.05 } else { 0.0 };
                self.water_temp.evolve(ambient_pull + heat);
                &self.water_temp
            }
            SensorKind::Ec => {
                let feed = if act.nutrient { 0.02 } else { 0.0 };
                self.ec.evolve(feed);
                &self.ec
            }
            SensorKind::Ph => {
                let push = match (act.ph_up, act.ph_down) {
                    (true, false) => 0.05,
                    (false, true) => -0.05,
                    _ => 0.0,
                };
                self.ph.evolve(push);
                &self.ph
            }
        };

        let mut reading = channel.value + gaussian(0.0, channel.noise_sigma);
        if fastrand::f32() < self.spike_prob {
            reading += gaussian(0.0, channel.noise_sigma * 20.0);
        }
        reading.clamp(channel.min, channel.max)
    }
}
