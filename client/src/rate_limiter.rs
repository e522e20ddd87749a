//! Sliding-window admission control shared by every externally invoked command

use crate::config::RateLimitConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Admits at most `quota` calls within any trailing `window`.
///
/// Admission never sleeps: a rejected caller gets `false` immediately and may
/// ask `time_until_next_admission` to phrase a wait hint.
#[derive(Debug)]
pub struct RateLimiter {
    quota: usize,
    window: Duration,
    enabled: bool,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(quota: usize, window: Duration) -> Self {
        Self {
            quota,
            window,
            enabled: true,
            calls: Mutex::new(VecDeque::with_capacity(quota)),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(0, Duration::ZERO)
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        if config.enabled {
            Self::new(config.calls, config.period)
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn admit(&self) -> bool {
        self.admit_at(Instant::now())
    }

    pub fn admit_at(&self, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        let mut calls = self.calls.lock();
        Self::trim(&mut calls, now, self.window);

        if calls.len() >= self.quota {
            return false;
        }

        calls.push_back(now);
        true
    }

    pub fn time_until_next_admission(&self) -> Duration {
        self.time_until_next_admission_at(Instant::now())
    }

    pub fn time_until_next_admission_at(&self, now: Instant) -> Duration {
        let calls = self.calls.lock();
        match calls.front() {
            Some(oldest) => self
                .window
                .saturating_sub(now.saturating_duration_since(*oldest)),
            None => Duration::ZERO,
        }
    }

    /// Number of admitted calls still inside the window
    pub fn calls_in_window(&self) -> usize {
        let mut calls = self.calls.lock();
        Self::trim(&mut calls, Instant::now(), self.window);
        calls.len()
    }

    fn trim(calls: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = calls.front() {
            if now.saturating_duration_since(*oldest) >= window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}
