pub mod config;
pub mod control;
pub mod grow;
pub mod irrigation;
pub mod photoperiod;
pub mod ports;
pub mod timer;
pub mod topics;
pub mod types;

pub use config::{
    ConfigError, DoserSettings, GrowConfig, IrrigationSettings, NetworkConfig, RuntimeConfig,
    SensorSettings, SettingsUpdate,
};
pub use control::{ControlDecision, ControlSet, ControlSettings, SensorControl, NUM_CHECKS};
pub use grow::{GrowCycleOrchestrator, SettingsError};
pub use irrigation::IrrigationCycle;
pub use photoperiod::{Alarm, LightPhase, Photoperiod};
pub use ports::{
    ControlClock, DoserActuator, MemoryStore, SettingsStore, StoreError, TaskController,
};
pub use timer::Timer;
pub use topics::*;
pub use types::{
    ControlPhase, ControlStatus, ControllerStatus, GrowStatus, SensorDataPayload, SensorKind,
    SensorReading, TaskId,
};
