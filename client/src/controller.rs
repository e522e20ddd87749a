//! Command surface exposed to agents
//!
//! Each agent talks to the controller through a session key. Every command
//! goes through [`Controller::guarded`], which applies the shared rate limiter,
//! times the handler, writes an event record and renders the reply text.

use crate::config::ControllerConfig;
use crate::error::{ArgumentError, ControllerError};
use crate::event_log::{Event, EventLog};
use crate::executor::ActionExecutor;
use crate::rate_limiter::RateLimiter;
use crate::report;
use crate::session::{ConnectionSession, GameLink, Identity, Phase};
use ctf_shared::{Command, Team, WorldSnapshot, MAX_NAME_LEN};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;

/// What the caller gets back from every command
#[derive(Debug, Clone)]
pub struct ToolReply {
    pub success: bool,
    pub text: String,
    pub snapshot: Option<Arc<WorldSnapshot>>,
}

/// A handler's result before the middleware turns it into a reply
struct Handled {
    success: bool,
    line: String,
    detail: Option<String>,
    snapshot: Option<Arc<WorldSnapshot>>,
}

impl Handled {
    fn ok(line: String, detail: Option<String>, snapshot: Option<Arc<WorldSnapshot>>) -> Self {
        Self {
            success: true,
            line,
            detail,
            snapshot,
        }
    }
}

/// Commands whose failures still show the caller where things stand
const ACTION_TOOLS: [&str; 3] = ["move_to", "attack", "send_team_message"];

pub struct Controller {
    config: ControllerConfig,
    limiter: RateLimiter,
    sessions: Mutex<HashMap<String, Arc<ConnectionSession>>>,
    /// Stands in for keys with no session; it is never connected
    observer: Arc<ConnectionSession>,
    events: EventLog,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        let events = EventLog::from_path(config.event_log.as_deref());
        Self::with_event_log(config, events)
    }

    pub fn with_event_log(config: ControllerConfig, events: EventLog) -> Self {
        Self {
            limiter: RateLimiter::from_config(&config.rate_limit),
            sessions: Mutex::new(HashMap::new()),
            observer: Arc::new(ConnectionSession::new(config.session.clone())),
            events,
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Live session for `key`, if that key has joined or is joining
    pub fn session(&self, key: &str) -> Option<Arc<ConnectionSession>> {
        self.sessions.lock().get(key).cloned()
    }

    /// Only `join` creates entries
    fn session_or_create(&self, key: &str) -> Arc<ConnectionSession> {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(key.to_string()).or_insert_with(|| {
            debug!("Creating session {}", key);
            Arc::new(ConnectionSession::new(self.config.session.clone()))
        });
        Arc::clone(session)
    }

    fn session_or_observer(&self, key: &str) -> Arc<ConnectionSession> {
        self.session(key).unwrap_or_else(|| Arc::clone(&self.observer))
    }

    /// Drops the entry for `key` if it is still `session` and holds no connection
    fn evict_if_idle(&self, key: &str, session: &Arc<ConnectionSession>) {
        let mut sessions = self.sessions.lock();
        let idle = sessions.get(key).is_some_and(|current| {
            Arc::ptr_eq(current, session) && current.phase() == Phase::Disconnected
        });
        if idle {
            sessions.remove(key);
            debug!("Removed idle session {}", key);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub async fn join(&self, key: &str, name: &str, team: &str) -> ToolReply {
        let agent = name.trim().to_string();
        self.guarded("join_game", key, Some(agent), |_| {
            self.handle_join(key, name, team)
        })
        .await
    }

    pub async fn move_to(&self, key: &str, x: f64, y: f64) -> ToolReply {
        self.guarded("move_to", key, None, |session| self.handle_move(session, x, y))
            .await
    }

    pub async fn attack(&self, key: &str) -> ToolReply {
        self.guarded("attack", key, None, |session| self.handle_attack(session))
            .await
    }

    pub async fn send_team_message(&self, key: &str, text: &str) -> ToolReply {
        self.guarded("send_team_message", key, None, |session| {
            self.handle_team_message(session, text)
        })
        .await
    }

    pub async fn disconnect(&self, key: &str) -> ToolReply {
        self.guarded("disconnect_from_game", key, None, |session| {
            self.handle_disconnect(key, session)
        })
        .await
    }

    /// Status report without acting
    pub async fn game_state(&self, key: &str) -> ToolReply {
        self.guarded("get_game_state", key, None, |session| {
            self.handle_game_state(session)
        })
        .await
    }

    async fn handle_join(
        &self,
        key: &str,
        name: &str,
        team: &str,
    ) -> Result<Handled, ControllerError> {
        let (name, team) = validate_join(name, team)?;
        let session = self.session_or_create(key);
        let player_id = match session.connect(&name, team).await {
            Ok(player_id) => player_id,
            Err(e) => {
                self.evict_if_idle(key, &session);
                return Err(e);
            }
        };
        self.events.record(Event::AgentConnected {
            agent: name.clone(),
            team,
        });

        sleep(self.config.join_settle).await;
        let executor = ActionExecutor::new(session.as_ref(), self.config.movement);
        let snapshot = executor.freshest_snapshot().await;

        let team_label = team.as_str().to_uppercase();
        let line = match snapshot.as_ref().and_then(|s| s.player(&player_id)) {
            Some(player) => format!(
                "Successfully joined as '{}' on {} team!\nStarting position: ({:.0}, {:.0})",
                name, team_label, player.x, player.y
            ),
            None => format!(
                "Joined as '{}' on {} team!\nPlayer not yet visible in game state",
                name, team_label
            ),
        };
        Ok(Handled::ok(
            line,
            Some(format!("player_id={}", player_id)),
            snapshot,
        ))
    }

    async fn handle_move(
        &self,
        session: Arc<ConnectionSession>,
        x: f64,
        y: f64,
    ) -> Result<Handled, ControllerError> {
        let executor = ActionExecutor::new(session.as_ref(), self.config.movement);
        let report = executor.move_to(x, y).await?;
        let name = agent_name(&session);

        Ok(Handled {
            success: report.outcome.is_success(),
            line: report.summary(&name),
            detail: Some(report.outcome.detail()),
            snapshot: report.snapshot,
        })
    }

    async fn handle_attack(&self, session: Arc<ConnectionSession>) -> Result<Handled, ControllerError> {
        let executor = ActionExecutor::new(session.as_ref(), self.config.movement);
        let report = executor.attack().await?;

        Ok(Handled::ok(
            format!("{} attacking nearby enemies", agent_name(&session)),
            None,
            report.snapshot,
        ))
    }

    async fn handle_team_message(
        &self,
        session: Arc<ConnectionSession>,
        text: &str,
    ) -> Result<Handled, ControllerError> {
        let executor = ActionExecutor::new(session.as_ref(), self.config.movement);
        let report = executor.send_team_message(text).await?;
        let sent = match &report.command {
            Command::Chat { message } => message.as_str(),
            _ => "",
        };

        Ok(Handled::ok(
            format!("Team message sent: \"{}\"", sent),
            Some("message_sent".to_string()),
            report.snapshot.clone(),
        ))
    }

    async fn handle_disconnect(
        &self,
        key: &str,
        session: Arc<ConnectionSession>,
    ) -> Result<Handled, ControllerError> {
        let closed = session.disconnect();
        self.evict_if_idle(key, &session);
        let line = match closed {
            Some(identity) => {
                self.events.record(Event::AgentDisconnected {
                    agent: identity.name.clone(),
                    reason: "client_disconnect",
                });
                format!(
                    "Disconnected {} from game. Another agent can now join.",
                    identity.name
                )
            }
            None => "Not connected to a game; nothing to disconnect.".to_string(),
        };
        Ok(Handled::ok(line, None, None))
    }

    async fn handle_game_state(
        &self,
        session: Arc<ConnectionSession>,
    ) -> Result<Handled, ControllerError> {
        let executor = ActionExecutor::new(session.as_ref(), self.config.movement);
        Ok(match executor.freshest_snapshot().await {
            Some(snapshot) => Handled::ok(String::new(), None, Some(snapshot)),
            None => Handled {
                success: false,
                line: "Error: game state unavailable".to_string(),
                detail: Some("state_unavailable".to_string()),
                snapshot: None,
            },
        })
    }

    /// Tears down every session, e.g. when the driver's input closes
    pub fn disconnect_all(&self) -> usize {
        let sessions: Vec<Arc<ConnectionSession>> =
            self.sessions.lock().values().cloned().collect();

        let mut closed = 0;
        for session in sessions {
            if let Some(identity) = session.disconnect() {
                self.events.record(Event::AgentDisconnected {
                    agent: identity.name,
                    reason: "shutdown",
                });
                closed += 1;
            }
        }
        self.sessions
            .lock()
            .retain(|_, session| session.phase() != Phase::Disconnected);
        closed
    }

    pub async fn shutdown(&self) {
        let closed = self.disconnect_all();
        info!("Controller shutting down, closed {} session(s)", closed);
        self.events.shutdown().await;
    }

    /// Rate limiting, timing and event recording around one command handler
    async fn guarded<F, Fut>(
        &self,
        tool: &'static str,
        key: &str,
        agent_hint: Option<String>,
        handler: F,
    ) -> ToolReply
    where
        F: FnOnce(Arc<ConnectionSession>) -> Fut,
        Fut: Future<Output = Result<Handled, ControllerError>>,
    {
        let session = self.session_or_observer(key);
        let agent = agent_hint
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| agent_name(&session));

        if !self.limiter.admit() {
            let wait = self.limiter.time_until_next_admission();
            self.events.record(Event::RateLimitHit {
                agent,
                calls_in_window: self.limiter.calls_in_window(),
                time_until_reset: wait,
            });
            return ToolReply {
                success: false,
                text: format!(
                    "Rate limit exceeded. Please wait {:.1} seconds before calling tools again. (Limit: {} calls per {:?} seconds)",
                    wait.as_secs_f64(),
                    self.limiter.quota(),
                    self.limiter.window().as_secs_f64()
                ),
                snapshot: None,
            };
        }

        let started = Instant::now();
        let result = handler(Arc::clone(&session)).await;
        let elapsed = started.elapsed();

        let handled = match result {
            Ok(handled) => handled,
            Err(e) => {
                debug!("{} for {} failed: {}", tool, agent, e);
                let snapshot = match &e {
                    ControllerError::Argument(_) | ControllerError::State(_)
                        if ACTION_TOOLS.contains(&tool) && session.identity().is_some() =>
                    {
                        ActionExecutor::new(session.as_ref(), self.config.movement)
                            .freshest_snapshot()
                            .await
                    }
                    _ => None,
                };
                Handled {
                    success: false,
                    line: format!("Error: {}", e),
                    detail: Some(e.tag().to_string()),
                    snapshot,
                }
            }
        };

        self.events.record(Event::ToolExecuted {
            tool,
            agent,
            elapsed,
            success: handled.success,
            detail: handled.detail,
        });

        // Join and disconnect may have changed which session `key` maps to
        let identity = self.session_or_observer(key).identity();
        ToolReply {
            success: handled.success,
            text: compose(&handled.line, handled.snapshot.as_deref(), identity.as_ref()),
            snapshot: handled.snapshot,
        }
    }
}

fn agent_name(session: &ConnectionSession) -> String {
    session
        .identity()
        .map(|identity| identity.name)
        .unwrap_or_else(|| "unknown".to_string())
}

fn validate_join(name: &str, team: &str) -> Result<(String, Team), ArgumentError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ArgumentError::EmptyName);
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ArgumentError::NameTooLong {
            len,
            max: MAX_NAME_LEN,
        });
    }
    let team = team
        .parse::<Team>()
        .map_err(|_| ArgumentError::InvalidTeam(team.to_string()))?;
    Ok((name.to_string(), team))
}

/// Outcome line followed by the status block, when there is a snapshot to show
fn compose(line: &str, snapshot: Option<&WorldSnapshot>, me: Option<&Identity>) -> String {
    match snapshot {
        Some(snapshot) if line.is_empty() => {
            format!("CURRENT GAME STATE:\n{}", report::render(snapshot, me))
        }
        Some(snapshot) => format!(
            "{}\n\nCURRENT GAME STATE:\n{}",
            line,
            report::render(snapshot, me)
        ),
        None => line.to_string(),
    }
}
