/// Polled countdown used for dose and cooldown durations.
///
/// Expiry is detected lazily: nothing fires when the deadline passes, the
/// next observation through [`Timer::is_active`] notices and disarms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    active: bool,
    start_ms: u64,
    duration_ms: u64,
    expired_pending: bool,
}

impl Timer {
    pub const fn new() -> Self {
        Self {
            active: false,
            start_ms: 0,
            duration_ms: 0,
            expired_pending: false,
        }
    }

    /// Arms the timer from `now_ms`, replacing any previous arming.
    pub fn arm(&mut self, now_ms: u64, duration_ms: u64) {
        self.active = true;
        self.start_ms = now_ms;
        self.duration_ms = duration_ms;
        self.expired_pending = false;
    }

    /// Arms the timer with a duration in seconds. Negative and non-finite
    /// durations arm a zero-length timer.
    pub fn arm_secs(&mut self, now_ms: u64, duration_s: f32) {
        self.arm(now_ms, secs_to_ms(duration_s));
    }

    pub fn disarm(&mut self) {
        self.active = false;
        self.expired_pending = false;
    }

    pub fn is_active(&mut self, now_ms: u64) -> bool {
        if self.active && now_ms >= self.deadline() {
            self.active = false;
            self.expired_pending = true;
        }
        self.active
    }

    pub fn is_expired(&mut self, now_ms: u64) -> bool {
        !self.is_active(now_ms)
    }

    /// Returns `true` exactly once after an armed timer has been observed
    /// past its deadline.
    pub fn take_expired(&mut self, now_ms: u64) -> bool {
        self.is_active(now_ms);
        std::mem::take(&mut self.expired_pending)
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        if !self.active {
            return 0;
        }
        self.deadline().saturating_sub(now_ms)
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        self.active.then(|| self.deadline())
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn deadline(&self) -> u64 {
        self.start_ms.saturating_add(self.duration_ms)
    }
}

pub fn secs_to_ms(duration_s: f32) -> u64 {
    if !duration_s.is_finite() || duration_s <= 0.0 {
        return 0;
    }
    (f64::from(duration_s) * 1_000.0).round().min(u64::MAX as f64) as u64
}
