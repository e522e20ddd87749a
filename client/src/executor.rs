//! Higher-level player actions built on a [`GameLink`]
//!
//! Movement is the only blocking action. A move command is fire-and-forget on
//! the wire, so the executor polls fresh snapshots until the player arrives,
//! stops short, dies, disappears or runs out of time. Every result carries the
//! freshest snapshot seen, because outcomes such as "blocked" and "timed out"
//! are hard to tell apart without looking at the world.

use crate::config::MovementTuning;
use crate::error::{ArgumentError, ControllerError, StateError};
use crate::session::{GameLink, Identity};
use ctf_shared::{
    Command, PlayerRecord, Point, WorldSnapshot, MAX_CHAT_LEN, WALL, WORLD_HEIGHT, WORLD_WIDTH,
};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// A validated move: where the caller asked to go and where we actually send the player
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRequest {
    pub start: Point,
    pub requested: Point,
    pub resolved: Point,
    /// Distance from `start` to `resolved`
    pub travel: f64,
    /// True when `requested` was further than one step and got shortened
    pub clamped: bool,
    pub deadline: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Reached { position: Point },
    /// Arrived at the intermediate point of a clamped move
    Partial {
        position: Point,
        remaining_to_requested: f64,
    },
    Blocked { position: Point, remaining: f64 },
    TimedOut { position: Point, remaining: f64 },
    Eliminated { position: Point },
    Lost,
}

impl MoveOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MoveOutcome::Reached { .. } | MoveOutcome::Partial { .. })
    }

    /// Compact `key=value` form for the event log
    pub fn detail(&self) -> String {
        match self {
            MoveOutcome::Reached { position } => {
                format!("x={:.1},y={:.1}", position.x, position.y)
            }
            MoveOutcome::Partial { position, .. } => {
                format!("x={:.1},y={:.1},partial_move=true", position.x, position.y)
            }
            MoveOutcome::Blocked { position, .. } => {
                format!("blocked_at_x={:.1},y={:.1}", position.x, position.y)
            }
            MoveOutcome::TimedOut { position, .. } => {
                format!("timeout_at_x={:.1},y={:.1}", position.x, position.y)
            }
            MoveOutcome::Eliminated { .. } => "player_eliminated".to_string(),
            MoveOutcome::Lost => "player_lost".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MoveReport {
    pub request: MoveRequest,
    pub outcome: MoveOutcome,
    pub elapsed: Duration,
    pub snapshot: Option<Arc<WorldSnapshot>>,
}

impl MoveReport {
    pub fn summary(&self, name: &str) -> String {
        match &self.outcome {
            MoveOutcome::Reached { position } => {
                format!("{} reached target position {}", name, position)
            }
            MoveOutcome::Partial {
                position,
                remaining_to_requested,
            } => format!(
                "{} moved towards target and reached intermediate point {}. Requested target {} is still {:.1} pixels away (moved {:.1} pixels closer, call again to continue).",
                name, position, self.request.requested, remaining_to_requested, self.request.travel
            ),
            MoveOutcome::Blocked {
                position,
                remaining,
            } => format!(
                "{} movement blocked at {}, {:.1} pixels from target. Path blocked by wall or obstacle.",
                name, position, remaining
            ),
            MoveOutcome::TimedOut {
                position,
                remaining,
            } => format!(
                "Movement timeout after {:.1}s: current position {}, {:.1} pixels from target",
                self.elapsed.as_secs_f64(),
                position,
                remaining
            ),
            MoveOutcome::Eliminated { position } => {
                format!("Movement interrupted: {} was eliminated at {}", name, position)
            }
            MoveOutcome::Lost => "Error: player lost during movement".to_string(),
        }
    }
}

/// Result of an instantaneous command
#[derive(Debug, Clone)]
pub struct CommandReport {
    pub command: Command,
    pub snapshot: Option<Arc<WorldSnapshot>>,
}

pub fn validate_target(target: Point) -> Result<(), ArgumentError> {
    if !(0.0..=WORLD_WIDTH).contains(&target.x) {
        return Err(ArgumentError::OutOfBounds {
            axis: "x",
            value: target.x,
            max: WORLD_WIDTH,
        });
    }
    if !(0.0..=WORLD_HEIGHT).contains(&target.y) {
        return Err(ArgumentError::OutOfBounds {
            axis: "y",
            value: target.y,
            max: WORLD_HEIGHT,
        });
    }
    Ok(())
}

/// Clamps the move to one step and rejects targets inside the wall
pub fn plan_move(
    start: Point,
    requested: Point,
    tuning: &MovementTuning,
) -> Result<MoveRequest, ArgumentError> {
    validate_target(requested)?;

    let clamped = start.distance_to(requested) > tuning.max_step;
    let resolved = if clamped {
        start.step_toward(requested, tuning.max_step)
    } else {
        requested
    };

    if WALL.contains(resolved) {
        return Err(ArgumentError::TargetInWall {
            x: resolved.x,
            y: resolved.y,
        });
    }

    let travel = start.distance_to(resolved);
    Ok(MoveRequest {
        start,
        requested,
        resolved,
        travel,
        clamped,
        deadline: tuning.deadline_for(travel),
    })
}

/// Checks a team message against the chat limits and returns it trimmed.
/// The length limit counts characters of the text as given, padding included.
pub fn validate_message(text: &str) -> Result<String, ArgumentError> {
    let message = text.trim();
    if message.is_empty() {
        return Err(ArgumentError::EmptyMessage);
    }
    let len = text.chars().count();
    if len > MAX_CHAT_LEN {
        return Err(ArgumentError::MessageTooLong {
            len,
            max: MAX_CHAT_LEN,
        });
    }
    Ok(message.to_string())
}

/// One poll of the convergence wait
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Done(MoveOutcome),
    Moving { position: Point, remaining: f64 },
}

/// Classifies the tracked player's state against the move. Elimination is
/// checked before arrival so a dead player at the target never counts as arrived.
pub fn evaluate(
    player: Option<&PlayerRecord>,
    request: &MoveRequest,
    tuning: &MovementTuning,
) -> Progress {
    let player = match player {
        Some(player) => player,
        None => return Progress::Done(MoveOutcome::Lost),
    };

    let position = player.position();
    if !player.is_alive {
        return Progress::Done(MoveOutcome::Eliminated { position });
    }

    let remaining = position.distance_to(request.resolved);
    if remaining <= tuning.arrive_epsilon {
        let outcome = if request.clamped {
            MoveOutcome::Partial {
                position,
                remaining_to_requested: position.distance_to(request.requested),
            }
        } else {
            MoveOutcome::Reached { position }
        };
        return Progress::Done(outcome);
    }

    if !player.is_moving && remaining > tuning.blocked_threshold {
        return Progress::Done(MoveOutcome::Blocked {
            position,
            remaining,
        });
    }

    Progress::Moving {
        position,
        remaining,
    }
}

pub struct ActionExecutor<'a, L: GameLink + ?Sized> {
    link: &'a L,
    tuning: MovementTuning,
}

impl<'a, L: GameLink + ?Sized> ActionExecutor<'a, L> {
    pub fn new(link: &'a L, tuning: MovementTuning) -> Self {
        Self { link, tuning }
    }

    fn joined(&self) -> Result<Identity, StateError> {
        self.link.identity().ok_or(StateError::NotJoined)
    }

    /// Snapshot from the request/response channel, or the mirror when that fails
    pub async fn freshest_snapshot(&self) -> Option<Arc<WorldSnapshot>> {
        match self.link.query_snapshot().await {
            Ok(snapshot) => Some(Arc::new(snapshot)),
            Err(e) => {
                debug!("Snapshot query failed, using mirror: {}", e);
                self.link.mirrored()
            }
        }
    }

    pub async fn move_to(&self, x: f64, y: f64) -> Result<MoveReport, ControllerError> {
        let identity = self.joined()?;
        let requested = Point::new(x, y);
        validate_target(requested)?;

        let initial = self.freshest_snapshot().await;
        let start = initial
            .as_ref()
            .and_then(|snapshot| {
                snapshot
                    .player(&identity.player_id)
                    .map(PlayerRecord::position)
            })
            .ok_or_else(|| StateError::NotInWorld(identity.player_id.clone()))?;

        let request = plan_move(start, requested, &self.tuning)?;
        if request.clamped {
            debug!(
                "Clamped move from {} toward {} to {}",
                start, requested, request.resolved
            );
        }

        self.link
            .send(Command::Move {
                x: request.resolved.x,
                y: request.resolved.y,
            })
            .await?;

        let started = Instant::now();
        let (outcome, snapshot) = self
            .await_convergence(&identity.player_id, &request, started, initial)
            .await;
        let elapsed = started.elapsed();

        info!(
            "Move of {} to {} finished in {:.2}s: {}",
            identity.name,
            request.resolved,
            elapsed.as_secs_f64(),
            outcome.detail()
        );

        Ok(MoveReport {
            request,
            outcome,
            elapsed,
            snapshot,
        })
    }

    async fn await_convergence(
        &self,
        player_id: &str,
        request: &MoveRequest,
        started: Instant,
        initial: Option<Arc<WorldSnapshot>>,
    ) -> (MoveOutcome, Option<Arc<WorldSnapshot>>) {
        let mut last_position = request.start;
        let mut last_snapshot = initial;

        loop {
            sleep(self.tuning.poll_interval).await;

            // No snapshot at all means the transport stalled; only the deadline can end that
            if let Some(snapshot) = self.freshest_snapshot().await {
                match evaluate(snapshot.player(player_id), request, &self.tuning) {
                    Progress::Done(outcome) => return (outcome, Some(snapshot)),
                    Progress::Moving { position, .. } => last_position = position,
                }
                last_snapshot = Some(snapshot);
            }

            if started.elapsed() > request.deadline {
                let outcome = MoveOutcome::TimedOut {
                    position: last_position,
                    remaining: last_position.distance_to(request.resolved),
                };
                return (outcome, last_snapshot);
            }
        }
    }

    pub async fn attack(&self) -> Result<CommandReport, ControllerError> {
        self.joined()?;
        self.dispatch(Command::Attack).await
    }

    pub async fn send_team_message(&self, text: &str) -> Result<CommandReport, ControllerError> {
        self.joined()?;
        let message = validate_message(text)?;
        self.dispatch(Command::Chat { message }).await
    }

    async fn dispatch(&self, command: Command) -> Result<CommandReport, ControllerError> {
        self.link.send(command.clone()).await?;
        Ok(CommandReport {
            command,
            snapshot: self.freshest_snapshot().await,
        })
    }
}
