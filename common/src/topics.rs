pub const TOPIC_LIVE_DATA: &str = "grow/live_data";
pub const TOPIC_CONTROLLER_STATUS: &str = "grow/controller/status";

pub const TOPIC_CMD_SETTINGS: &str = "grow/cmnd/sensor_settings";
pub const TOPIC_CMD_GROW_CYCLE: &str = "grow/cmnd/grow_cycle";
pub const TOPIC_CMD_IRRIGATION: &str = "grow/cmnd/irrigation";
