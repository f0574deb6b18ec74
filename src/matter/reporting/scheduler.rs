//! Per-subscription report timing.
//!
//! A subscription may report once its min interval has elapsed and something
//! changed, and must report once its max interval has elapsed even if
//! nothing did. Both deadlines are measured from the completion of the
//! previous report. While a report is in flight nothing else is scheduled.

use std::time::Duration;

use strum::Display;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ScheduleState {
    /// Nothing pending before the max interval.
    Idle,
    /// Dirty, but the min interval has not elapsed yet.
    WaitingMinInterval,
    Reportable,
    InFlight,
}

#[derive(Clone, Debug)]
pub struct IntervalScheduler {
    min_interval: Duration,
    max_interval: Duration,
    min_deadline: Duration,
    max_deadline: Duration,
    dirty: bool,
    in_flight: bool,
}

impl IntervalScheduler {
    /// A scheduler for a subscription whose priming report is in flight.
    pub fn new(min_interval_secs: u16, max_interval_secs: u16) -> Self {
        Self {
            min_interval: Duration::from_secs(min_interval_secs.into()),
            max_interval: Duration::from_secs(max_interval_secs.into()),
            min_deadline: Duration::ZERO,
            max_deadline: Duration::ZERO,
            dirty: false,
            in_flight: true,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Flag pending data. Returns true when this changes the next deadline.
    pub fn mark_dirty(&mut self, now: Duration) -> bool {
        if self.dirty {
            return false;
        }
        self.dirty = true;
        !self.in_flight && now < self.max_deadline
    }

    pub fn is_reportable(&self, now: Duration) -> bool {
        !self.in_flight
            && ((self.dirty && now >= self.min_deadline) || now >= self.max_deadline)
    }

    /// A report begins. Changes from here on belong to the next one.
    pub fn report_started(&mut self) {
        self.in_flight = true;
        self.dirty = false;
    }

    /// The last chunk of a report was acknowledged; restart both intervals.
    pub fn report_completed(&mut self, now: Duration) {
        self.in_flight = false;
        self.min_deadline = now + self.min_interval;
        self.max_deadline = now + self.max_interval;
    }

    /// Time at which this subscription next needs attention.
    pub fn next_deadline(&self) -> Option<Duration> {
        if self.in_flight {
            None
        } else if self.dirty {
            Some(self.min_deadline.min(self.max_deadline))
        } else {
            Some(self.max_deadline)
        }
    }

    pub fn state(&self, now: Duration) -> ScheduleState {
        if self.in_flight {
            ScheduleState::InFlight
        } else if self.is_reportable(now) {
            ScheduleState::Reportable
        } else if self.dirty {
            ScheduleState::WaitingMinInterval
        } else {
            ScheduleState::Idle
        }
    }
}
