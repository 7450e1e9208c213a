use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// Daily wall-clock alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub hour: u8,
    pub minute: u8,
}

impl Alarm {
    pub const fn new(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    pub fn validate(&self) -> bool {
        self.hour < 24 && self.minute < 60
    }

    fn minutes(self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LightPhase {
    Day,
    Night,
}

/// Day/night split driven by two alarms. A night alarm earlier than the day
/// alarm means the day wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photoperiod {
    #[serde(rename = "dayStart")]
    pub day_start: Alarm,
    #[serde(rename = "nightStart")]
    pub night_start: Alarm,
}

impl Default for Photoperiod {
    fn default() -> Self {
        Self {
            day_start: Alarm::new(6, 0),
            night_start: Alarm::new(22, 0),
        }
    }
}

impl Photoperiod {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !self.day_start.validate() {
            self.day_start = defaults.day_start;
        }
        if !self.night_start.validate() {
            self.night_start = defaults.night_start;
        }
    }

    pub fn is_day(&self, time: NaiveTime) -> bool {
        let now = time.hour() as u16 * 60 + time.minute() as u16;
        let day = self.day_start.minutes();
        let night = self.night_start.minutes();

        if day == night {
            true
        } else if day < night {
            now >= day && now < night
        } else {
            now >= day || now < night
        }
    }

    pub fn phase_at(&self, time: NaiveTime) -> LightPhase {
        if self.is_day(time) {
            LightPhase::Day
        } else {
            LightPhase::Night
        }
    }

    /// Next alarm strictly after `now`, with the phase it switches to.
    pub fn next_transition(
        &self,
        now: DateTime<FixedOffset>,
    ) -> Option<(DateTime<FixedOffset>, LightPhase)> {
        if self.day_start == self.night_start {
            return None;
        }

        let mut best: Option<(DateTime<FixedOffset>, LightPhase)> = None;

        for day_offset in 0..2i64 {
            let date = now.date_naive() + Duration::days(day_offset);
            for (alarm, phase) in [
                (self.day_start, LightPhase::Day),
                (self.night_start, LightPhase::Night),
            ] {
                let Some(naive) = date.and_hms_opt(alarm.hour as u32, alarm.minute as u32, 0)
                else {
                    continue;
                };
                let Some(candidate) = now.offset().from_local_datetime(&naive).single() else {
                    continue;
                };
                if candidate <= now {
                    continue;
                }
                if best.map(|(current, _)| candidate < current).unwrap_or(true) {
                    best = Some((candidate, phase));
                }
            }
        }

        best
    }
}
