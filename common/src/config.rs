use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    control::{ControlSettings, DEFAULT_SAMPLE_PERIOD_MS, NUM_CHECKS},
    photoperiod::Photoperiod,
    types::SensorKind,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
    #[error("{field} must not be negative")]
    Negative { field: &'static str },
    #[error("{0} cannot dose")]
    NotADoser(&'static str),
    #[error("alarmMin {min} is above alarmMax {max}")]
    AlarmRange { min: f32, max: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoserSettings {
    /// Full dose duration in seconds.
    #[serde(rename = "doseTime")]
    pub dose_time_s: f32,
    /// Cooldown in seconds, measured from detection to the next detection.
    #[serde(rename = "waitTime")]
    pub wait_time_s: f32,
}

/// Persisted control record for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSettings {
    pub enabled: bool,
    #[serde(rename = "targetValue")]
    pub target_value: f32,
    #[serde(rename = "nightTargetValue")]
    pub night_target_value: f32,
    #[serde(rename = "dayNightActive", default)]
    pub day_night_active: bool,
    #[serde(rename = "marginError")]
    pub margin_error: f32,
    #[serde(default)]
    pub doser: Option<DoserSettings>,
    /// Report readings without ever acting on them.
    #[serde(rename = "monitoringOnly", default)]
    pub monitoring_only: bool,
    /// Readings below this raise the out-of-bounds alarm.
    #[serde(rename = "alarmMin", default, skip_serializing_if = "Option::is_none")]
    pub alarm_min: Option<f32>,
    #[serde(rename = "alarmMax", default, skip_serializing_if = "Option::is_none")]
    pub alarm_max: Option<f32>,
}

impl SensorSettings {
    pub fn default_for(kind: SensorKind) -> Self {
        match kind {
            SensorKind::WaterTemp => Self {
                enabled: false,
                target_value: 22.0,
                night_target_value: 20.0,
                day_night_active: false,
                margin_error: 1.0,
                doser: None,
                monitoring_only: false,
                alarm_min: Some(15.0),
                alarm_max: Some(28.0),
            },
            SensorKind::Ec => Self {
                enabled: false,
                target_value: 1.6,
                night_target_value: 1.6,
                day_night_active: false,
                margin_error: 0.2,
                doser: Some(DoserSettings {
                    dose_time_s: 30.0,
                    wait_time_s: 300.0,
                }),
                monitoring_only: false,
                alarm_min: Some(0.8),
                alarm_max: Some(3.0),
            },
            SensorKind::Ph => Self {
                enabled: false,
                target_value: 6.0,
                night_target_value: 6.0,
                day_night_active: false,
                margin_error: 0.3,
                doser: Some(DoserSettings {
                    dose_time_s: 10.0,
                    wait_time_s: 120.0,
                }),
                monitoring_only: false,
                alarm_min: Some(5.0),
                alarm_max: Some(7.0),
            },
        }
    }

    pub fn control_settings(&self) -> ControlSettings {
        ControlSettings {
            enabled: self.enabled && !self.monitoring_only,
            target_value: self.target_value,
            margin_error: self.margin_error,
            night_target_value: self.night_target_value,
            day_night_active: self.day_night_active,
        }
    }

    /// Rejects records that would make the control misbehave. Water
    /// temperature drives a continuous heater, so it must not carry dosing
    /// parameters.
    pub fn validate(&self, kind: SensorKind) -> Result<(), ConfigError> {
        finite("targetValue", self.target_value)?;
        finite("nightTargetValue", self.night_target_value)?;
        non_negative("marginError", self.margin_error)?;
        if let Some(min) = self.alarm_min {
            finite("alarmMin", min)?;
        }
        if let Some(max) = self.alarm_max {
            finite("alarmMax", max)?;
        }
        if let (Some(min), Some(max)) = (self.alarm_min, self.alarm_max) {
            if min > max {
                return Err(ConfigError::AlarmRange { min, max });
            }
        }

        if let Some(doser) = &self.doser {
            if kind == SensorKind::WaterTemp {
                return Err(ConfigError::NotADoser(kind.as_str()));
            }
            non_negative("doseTime", doser.dose_time_s)?;
            non_negative("waitTime", doser.wait_time_s)?;
        }

        Ok(())
    }

    /// True when the cooldown is shorter than the time already spent
    /// debouncing, so the wait timer collapses to zero.
    pub fn wait_shorter_than_debounce(&self, sample_period_ms: u64) -> bool {
        let Some(doser) = &self.doser else {
            return false;
        };
        let debounce_s = NUM_CHECKS as f32 * sample_period_ms as f32 / 1_000.0;
        doser.wait_time_s < debounce_s
    }
}

fn finite(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value < 0.0 {
        return Err(ConfigError::Negative { field });
    }
    Ok(())
}

/// Settings message carrying any subset of the per-sensor records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub water_temp: Option<SensorSettings>,
    #[serde(default)]
    pub ec: Option<SensorSettings>,
    #[serde(default)]
    pub ph: Option<SensorSettings>,
}

impl SettingsUpdate {
    pub fn entries(&self) -> impl Iterator<Item = (SensorKind, &SensorSettings)> {
        [
            (SensorKind::WaterTemp, self.water_temp.as_ref()),
            (SensorKind::Ec, self.ec.as_ref()),
            (SensorKind::Ph, self.ph.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, settings)| settings.map(|settings| (kind, settings)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrrigationSettings {
    #[serde(rename = "onIntervalS")]
    pub on_interval_s: u32,
    #[serde(rename = "offIntervalS")]
    pub off_interval_s: u32,
}

impl Default for IrrigationSettings {
    fn default() -> Self {
        Self {
            on_interval_s: 15 * 60,
            off_interval_s: 45 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowConfig {
    pub sample_period_ms: u64,
    /// Pause between suspending the grow tasks and parking the dosers.
    pub settle_delay_ms: u64,
    pub publish_interval_ms: u64,
    pub timer_alarm_interval_ms: u64,
    #[serde(default)]
    pub photoperiod: Photoperiod,
    #[serde(default)]
    pub irrigation: IrrigationSettings,
}

impl Default for GrowConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: DEFAULT_SAMPLE_PERIOD_MS,
            settle_delay_ms: 4_000,
            publish_interval_ms: DEFAULT_SAMPLE_PERIOD_MS,
            timer_alarm_interval_ms: 1_000,
            photoperiod: Photoperiod::default(),
            irrigation: IrrigationSettings::default(),
        }
    }
}

impl GrowConfig {
    pub fn sanitize(&mut self) {
        self.sample_period_ms = self.sample_period_ms.clamp(100, 600_000);
        self.settle_delay_ms = self.settle_delay_ms.min(60_000);
        self.publish_interval_ms = self.publish_interval_ms.clamp(500, 3_600_000);
        self.timer_alarm_interval_ms = self.timer_alarm_interval_ms.clamp(100, 60_000);
        self.photoperiod.sanitize();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub device_id: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            device_id: "grow-controller".to_string(),
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub controller: GrowConfig,
    pub timezone: String,
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: GrowConfig::default(),
            timezone: "America/Los_Angeles".to_string(),
            network: NetworkConfig::default(),
        }
    }
}
