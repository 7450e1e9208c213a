use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    WaterTemp,
    Ec,
    Ph,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [Self::WaterTemp, Self::Ec, Self::Ph];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaterTemp => "water_temp",
            Self::Ec => "ec",
            Self::Ph => "ph",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::WaterTemp => "WATER_TEMP_CONTROL",
            Self::Ec => "EC_CONTROL",
            Self::Ph => "PH_CONTROL",
        }
    }

    /// Namespace holding the persisted control record for this sensor.
    pub fn settings_namespace(self) -> &'static str {
        match self {
            Self::WaterTemp => "wt_settings",
            Self::Ec => "ec_settings",
            Self::Ph => "ph_settings",
        }
    }

    pub fn sampling_task(self) -> TaskId {
        match self {
            Self::WaterTemp => TaskId::WaterTempSampling,
            Self::Ec => TaskId::EcSampling,
            Self::Ph => TaskId::PhSampling,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "water_temp" | "water_temperature" => Some(Self::WaterTemp),
            "ec" => Some(Self::Ec),
            "ph" => Some(Self::Ph),
            _ => None,
        }
    }
}

/// Concurrent tasks whose lifecycle follows the grow cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    TimerAlarm,
    Publish,
    ControlEvaluation,
    WaterTempSampling,
    EcSampling,
    PhSampling,
    Sync,
}

impl TaskId {
    pub const ALL: [TaskId; 7] = [
        Self::TimerAlarm,
        Self::Publish,
        Self::ControlEvaluation,
        Self::WaterTempSampling,
        Self::EcSampling,
        Self::PhSampling,
        Self::Sync,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimerAlarm => "timer_alarm_task",
            Self::Publish => "publish_task",
            Self::ControlEvaluation => "sensor_control_task",
            Self::WaterTempSampling => "water_temp_task",
            Self::EcSampling => "ec_task",
            Self::PhSampling => "ph_task",
            Self::Sync => "sync_task",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlPhase {
    Disabled,
    Idle,
    Debouncing,
    Triggered,
    Dosing,
    Cooling,
}

impl ControlPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::Idle => "IDLE",
            Self::Debouncing => "DEBOUNCING",
            Self::Triggered => "TRIGGERED",
            Self::Dosing => "DOSING",
            Self::Cooling => "COOLING",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlStatus {
    pub name: String,
    pub enabled: bool,
    pub active: bool,
    #[serde(rename = "isDoser")]
    pub is_doser: bool,
    pub phase: &'static str,
    #[serde(rename = "targetValue")]
    pub target_value: f32,
    #[serde(rename = "marginError")]
    pub margin_error: f32,
    #[serde(rename = "outOfRangeCount")]
    pub out_of_range_count: u32,
    #[serde(rename = "dosePercentage")]
    pub dose_percentage: f32,
    #[serde(rename = "doseRemainingMs")]
    pub dose_remaining_ms: u64,
    #[serde(rename = "waitRemainingMs")]
    pub wait_remaining_ms: u64,
    /// Last reading was outside the alarm bounds.
    pub alarm: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GrowStatus {
    #[serde(rename = "settingsReceived")]
    pub settings_received: bool,
    #[serde(rename = "growActive")]
    pub grow_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub name: &'static str,
    pub value: f32,
}

/// Live data published once per sample period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorDataPayload {
    pub time: String,
    pub sensors: Vec<SensorReading>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    #[serde(flatten)]
    pub grow: GrowStatus,
    #[serde(rename = "isDay")]
    pub is_day: bool,
    #[serde(rename = "irrigationOn")]
    pub irrigation_on: bool,
    #[serde(rename = "nextPhotoperiodEpoch")]
    pub next_photoperiod_epoch: Option<i64>,
    pub timezone: String,
    pub readings: Vec<SensorReading>,
    pub controls: Vec<ControlStatus>,
}
