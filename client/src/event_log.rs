//! Append-only record of what the controller did on behalf of each agent
//!
//! Every event is emitted through `log` under the `events` target. When a file
//! is configured the same line is also appended there by a background task, so
//! recording never blocks a command and a failing disk never fails one either.

use chrono::{Local, NaiveDateTime};
use ctf_shared::Team;
use log::{info, warn};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

pub const COMPONENT: &str = "controller";

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ToolExecuted {
        tool: &'static str,
        agent: String,
        elapsed: Duration,
        success: bool,
        detail: Option<String>,
    },
    RateLimitHit {
        agent: String,
        calls_in_window: usize,
        time_until_reset: Duration,
    },
    AgentConnected {
        agent: String,
        team: Team,
    },
    AgentDisconnected {
        agent: String,
        reason: &'static str,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ToolExecuted { .. } => "tool_executed",
            Event::RateLimitHit { .. } => "rate_limit_hit",
            Event::AgentConnected { .. } => "agent_connected",
            Event::AgentDisconnected { .. } => "agent_disconnected",
        }
    }

    /// Space-separated `key=value` pairs following the event name
    pub fn fields(&self) -> String {
        match self {
            Event::ToolExecuted {
                tool,
                agent,
                elapsed,
                success,
                detail,
            } => {
                let mut fields = format!(
                    "tool={} agent={} execution_time_ms={} success={}",
                    tool,
                    agent,
                    elapsed.as_millis(),
                    success
                );
                if let Some(detail) = detail {
                    fields.push_str(" details=");
                    fields.push_str(detail);
                }
                fields
            }
            Event::RateLimitHit {
                agent,
                calls_in_window,
                time_until_reset,
            } => format!(
                "agent={} calls_in_window={} time_until_reset={:.1}",
                agent,
                calls_in_window,
                time_until_reset.as_secs_f64()
            ),
            Event::AgentConnected { agent, team } => {
                format!("agent_name={} team={}", agent, team)
            }
            Event::AgentDisconnected { agent, reason } => {
                format!("agent={} reason={}", agent, reason)
            }
        }
    }
}

pub fn format_line(timestamp: NaiveDateTime, event: &Event) -> String {
    format!(
        "{} component={} event={} {}",
        timestamp.format("%Y-%m-%d %H:%M:%S"),
        COMPONENT,
        event.name(),
        event.fields()
    )
}

#[derive(Debug, Default)]
pub struct EventLog {
    sink: Mutex<Option<UnboundedSender<String>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl EventLog {
    /// Log-target output only
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Also appends to `path`. Must be called inside a Tokio runtime.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_lines(path, rx));

        Self {
            sink: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
        }
    }

    pub fn from_path(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::to_file(path),
            None => Self::disabled(),
        }
    }

    pub fn record(&self, event: Event) {
        let line = format_line(Local::now().naive_local(), &event);
        info!(target: "events", "{}", line);

        if let Some(sink) = self.sink.lock().as_ref() {
            // Only fails once the writer task is gone
            let _ = sink.send(line);
        }
    }

    /// Stops accepting events and waits for buffered lines to reach the file
    pub async fn shutdown(&self) {
        self.sink.lock().take();
        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                warn!("Event log writer ended abnormally: {}", e);
            }
        }
    }
}

async fn write_lines(path: PathBuf, mut lines: UnboundedReceiver<String>) {
    let mut file = match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(file) => file,
        Err(e) => {
            warn!("Cannot open event log {}: {}", path.display(), e);
            // Drain so senders never notice
            while lines.recv().await.is_some() {}
            return;
        }
    };

    while let Some(mut line) = lines.recv().await {
        line.push('\n');
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!("Failed to write event log entry: {}", e);
            continue;
        }
        if let Err(e) = file.flush().await {
            warn!("Failed to flush event log: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_tool_executed_line() {
        let event = Event::ToolExecuted {
            tool: "move_to",
            agent: "Scout".to_string(),
            elapsed: Duration::from_millis(1520),
            success: true,
            detail: Some("x=700.0,y=300.0".to_string()),
        };
        assert_eq!(
            format_line(at(9, 5, 7), &event),
            "2025-03-14 09:05:07 component=controller event=tool_executed tool=move_to agent=Scout execution_time_ms=1520 success=true details=x=700.0,y=300.0"
        );
    }

    #[test]
    fn test_line_without_detail() {
        let event = Event::ToolExecuted {
            tool: "attack",
            agent: "Scout".to_string(),
            elapsed: Duration::from_millis(3),
            success: true,
            detail: None,
        };
        assert!(format_line(at(0, 0, 0), &event).ends_with("success=true"));
    }

    #[test]
    fn test_other_events() {
        let hit = Event::RateLimitHit {
            agent: "unknown".to_string(),
            calls_in_window: 10,
            time_until_reset: Duration::from_millis(460),
        };
        assert_eq!(
            hit.fields(),
            "agent=unknown calls_in_window=10 time_until_reset=0.5"
        );

        let joined = Event::AgentConnected {
            agent: "Scout".to_string(),
            team: Team::Blue,
        };
        assert_eq!(joined.name(), "agent_connected");
        assert_eq!(joined.fields(), "agent_name=Scout team=blue");

        let left = Event::AgentDisconnected {
            agent: "Scout".to_string(),
            reason: "client_disconnect",
        };
        assert_eq!(left.fields(), "agent=Scout reason=client_disconnect");
    }

    #[tokio::test]
    async fn test_disabled_log_accepts_events() {
        let log = EventLog::disabled();
        log.record(Event::AgentDisconnected {
            agent: "Scout".to_string(),
            reason: "shutdown",
        });
        log.shutdown().await;
    }

    #[tokio::test]
    async fn test_file_sink_appends_lines() {
        let path = std::env::temp_dir().join(format!("ctf-events-{}.log", uuid::Uuid::new_v4()));

        let log = EventLog::to_file(&path);
        log.record(Event::AgentConnected {
            agent: "Scout".to_string(),
            team: Team::Red,
        });
        log.record(Event::AgentDisconnected {
            agent: "Scout".to_string(),
            reason: "client_disconnect",
        });
        log.shutdown().await;

        // Recording after shutdown is silently dropped
        log.record(Event::AgentDisconnected {
            agent: "Ghost".to_string(),
            reason: "client_disconnect",
        });

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("component=controller event=agent_connected agent_name=Scout team=red"));
        assert!(lines[1].contains("event=agent_disconnected"));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_unwritable_path_does_not_fail_recording() {
        let path = std::env::temp_dir()
            .join(format!("ctf-missing-{}", uuid::Uuid::new_v4()))
            .join("events.log");

        let log = EventLog::to_file(&path);
        log.record(Event::AgentConnected {
            agent: "Scout".to_string(),
            team: Team::Red,
        });
        log.shutdown().await;
        assert!(!path.exists());
    }
}
