//! Immutable runtime configuration assembled from command-line arguments

use ctf_shared::PLAYER_SPEED;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Game server `host:port`
    pub server: String,
    /// How long to wait after the join frame for an asynchronous rejection
    pub join_grace: Duration,
    pub http_timeout: Duration,
}

impl SessionConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Self::default()
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.server)
    }

    pub fn http_url(&self) -> String {
        format!("http://{}/game-state", self.server)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server: "localhost:8080".to_string(),
            join_grace: Duration::from_millis(100),
            http_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub calls: usize,
    pub period: Duration,
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls: 10,
            period: Duration::from_secs(1),
            enabled: true,
        }
    }
}

/// Constants of the blocking move protocol
#[derive(Debug, Clone, Copy)]
pub struct MovementTuning {
    /// Longest displacement a single move command may request
    pub max_step: f64,
    /// Remaining distance at which a move counts as arrived
    pub arrive_epsilon: f64,
    /// Remaining distance above which a stopped player counts as blocked
    pub blocked_threshold: f64,
    pub poll_interval: Duration,
    /// Pixels per second used to estimate the move deadline
    pub nominal_speed: f64,
    pub min_deadline: Duration,
}

impl MovementTuning {
    pub fn deadline_for(&self, distance: f64) -> Duration {
        let estimate = Duration::from_secs_f64((distance / self.nominal_speed).max(0.0));
        estimate.max(self.min_deadline)
    }
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            max_step: 200.0,
            arrive_epsilon: 2.0,
            blocked_threshold: 5.0,
            poll_interval: Duration::from_millis(100),
            nominal_speed: PLAYER_SPEED,
            min_deadline: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub movement: MovementTuning,
    /// Pause after a successful join before reading the starting position
    pub join_settle: Duration,
    /// Append-only event log file; events still go through `log` when unset
    pub event_log: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            movement: MovementTuning::default(),
            join_settle: Duration::from_millis(500),
            event_log: None,
        }
    }
}
