//! Countdown for timed sessions.
//!
//! The timer does not read a clock. Whoever drives it calls [`CountdownTimer::tick`]
//! once per elapsed second; a tokio interval in production, a loop in tests.

/// Lifecycle of a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Never started. Practice sessions stay here for their whole life.
    Inactive,
    Running { remaining_secs: u32 },
    /// Reached zero. Terminal.
    Expired,
    /// Torn down before reaching zero (session submitted or view dismissed). Terminal.
    Stopped,
}

/// What a single tick produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// The timer is not running; nothing happened.
    Idle,
    Tick { remaining_secs: u32 },
    /// The countdown just reached zero. Emitted exactly once per timer.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTimer {
    state: TimerState,
    limit_secs: Option<u32>,
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::inactive()
    }
}

impl CountdownTimer {
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            state: TimerState::Inactive,
            limit_secs: None,
        }
    }

    /// Starts counting down from `limit_secs`.
    ///
    /// Only an inactive timer can start; calling this in any other state is ignored
    /// and returns `false`. A zero limit expires on the first tick.
    pub fn start(&mut self, limit_secs: u32) -> bool {
        if self.state != TimerState::Inactive {
            return false;
        }
        self.limit_secs = Some(limit_secs);
        self.state = TimerState::Running {
            remaining_secs: limit_secs,
        };
        true
    }

    /// Advances the countdown by one second.
    pub fn tick(&mut self) -> TimerEvent {
        let TimerState::Running { remaining_secs } = self.state else {
            return TimerEvent::Idle;
        };

        let remaining_secs = remaining_secs.saturating_sub(1);
        if remaining_secs == 0 {
            self.state = TimerState::Expired;
            TimerEvent::Expired
        } else {
            self.state = TimerState::Running { remaining_secs };
            TimerEvent::Tick { remaining_secs }
        }
    }

    /// Tears the timer down. Has no effect once it has expired.
    pub fn stop(&mut self) {
        if matches!(self.state, TimerState::Inactive | TimerState::Running { .. }) {
            self.state = TimerState::Stopped;
        }
    }

    #[must_use]
    pub fn state(&self) -> TimerState {
        self.state
    }

    #[must_use]
    pub fn limit_secs(&self) -> Option<u32> {
        self.limit_secs
    }

    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        match self.state {
            TimerState::Running { remaining_secs } => Some(remaining_secs),
            TimerState::Expired => Some(0),
            TimerState::Inactive | TimerState::Stopped => None,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.state == TimerState::Expired
    }
}
