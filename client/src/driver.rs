//! Newline-delimited JSON front end for the controller
//!
//! One request per input line, one reply per output line. Requests run
//! concurrently, so replies can come back out of order; callers match them by
//! `id`. Input EOF or a read error waits for in-flight requests, then
//! disconnects everything.

use crate::controller::{Controller, ToolReply};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;

pub const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub session: Option<String>,
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    pub id: Value,
    pub success: bool,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Join { name: String, team: String },
    MoveTo { x: f64, y: f64 },
    Attack,
    SendTeamMessage { message: String },
    Disconnect,
    GameState,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("malformed request: input is not valid UTF-8 ({0})")]
    InvalidUtf8(#[source] std::str::Utf8Error),
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {source}")]
    InvalidArgs {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct JoinArgs {
    #[serde(alias = "player_name")]
    name: String,
    team: String,
}

#[derive(Deserialize)]
struct MoveArgs {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct MessageArgs {
    message: String,
}

impl ToolCall {
    pub fn parse(tool: &str, args: Value) -> Result<ToolCall, RequestError> {
        // Tools without arguments accept a missing, null or empty `args`
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        let invalid = |source| RequestError::InvalidArgs {
            tool: tool.to_string(),
            source,
        };

        match tool {
            "join" | "join_game" => {
                let JoinArgs { name, team } = serde_json::from_value(args).map_err(invalid)?;
                Ok(ToolCall::Join { name, team })
            }
            "move_to" | "move_to_position" => {
                let MoveArgs { x, y } = serde_json::from_value(args).map_err(invalid)?;
                Ok(ToolCall::MoveTo { x, y })
            }
            "attack" => Ok(ToolCall::Attack),
            "send_team_message" => {
                let MessageArgs { message } = serde_json::from_value(args).map_err(invalid)?;
                Ok(ToolCall::SendTeamMessage { message })
            }
            "disconnect" | "disconnect_from_game" => Ok(ToolCall::Disconnect),
            "game_state" | "get_game_state" => Ok(ToolCall::GameState),
            other => Err(RequestError::UnknownTool(other.to_string())),
        }
    }

    pub async fn execute(self, controller: &Controller, session: &str) -> ToolReply {
        match self {
            ToolCall::Join { name, team } => controller.join(session, &name, &team).await,
            ToolCall::MoveTo { x, y } => controller.move_to(session, x, y).await,
            ToolCall::Attack => controller.attack(session).await,
            ToolCall::SendTeamMessage { message } => {
                controller.send_team_message(session, &message).await
            }
            ToolCall::Disconnect => controller.disconnect(session).await,
            ToolCall::GameState => controller.game_state(session).await,
        }
    }
}

/// Parses one input line into its id, session key and call
pub fn parse_line(line: &str) -> Result<(Value, String, ToolCall), Reply> {
    let request: Request = serde_json::from_str(line).map_err(|e| Reply {
        id: Value::Null,
        success: false,
        text: format!("Error: {}", RequestError::Malformed(e)),
    })?;

    let session = request
        .session
        .filter(|key| !key.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    match ToolCall::parse(&request.tool, request.args) {
        Ok(call) => Ok((request.id, session, call)),
        Err(e) => Err(Reply {
            id: request.id,
            success: false,
            text: format!("Error: {}", e),
        }),
    }
}

pub async fn run<R, W>(controller: Arc<Controller>, input: R, output: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = serve(&controller, input, output).await;
    if let Err(e) = &result {
        warn!("Driver stopped early: {}", e);
    }
    controller.shutdown().await;
    result
}

async fn serve<R, W>(controller: &Arc<Controller>, mut input: R, mut output: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Bytes of a partly read line survive a select! round in here
    let mut buf = Vec::new();
    let mut pending: JoinSet<Reply> = JoinSet::new();
    let mut input_open = true;
    let mut read_error = None;

    while input_open || !pending.is_empty() {
        tokio::select! {
            read = input.read_until(b'\n', &mut buf), if input_open => match read {
                Ok(n) => {
                    if n == 0 {
                        info!("Input closed, waiting for {} request(s)", pending.len());
                        input_open = false;
                    }
                    if !buf.is_empty() {
                        let raw = std::mem::take(&mut buf);
                        if let Some(reply) = accept(controller, &mut pending, raw) {
                            write_reply(&mut output, &reply).await?;
                        }
                    }
                }
                Err(e) => {
                    warn!("Input failed, waiting for {} request(s): {}", pending.len(), e);
                    read_error = Some(e);
                    input_open = false;
                }
            },
            Some(done) = pending.join_next(), if !pending.is_empty() => match done {
                Ok(reply) => write_reply(&mut output, &reply).await?,
                Err(e) => warn!("Request task failed: {}", e),
            },
        }
    }

    read_error.map_or(Ok(()), Err)
}

/// Starts the request on one raw input line, or returns the reply to a bad one
fn accept(
    controller: &Arc<Controller>,
    pending: &mut JoinSet<Reply>,
    raw: Vec<u8>,
) -> Option<Reply> {
    let line = match String::from_utf8(raw) {
        Ok(line) => line,
        Err(e) => {
            return Some(Reply {
                id: Value::Null,
                success: false,
                text: format!("Error: {}", RequestError::InvalidUtf8(e.utf8_error())),
            })
        }
    };
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match parse_line(line) {
        Ok((id, session, call)) => {
            debug!("Request {} on session {}: {:?}", id, session, call);
            let controller = Arc::clone(controller);
            pending.spawn(async move {
                let reply = call.execute(&controller, &session).await;
                Reply {
                    id,
                    success: reply.success,
                    text: reply.text,
                }
            });
            None
        }
        Err(reply) => Some(reply),
    }
}

async fn write_reply<W: AsyncWrite + Unpin>(output: &mut W, reply: &Reply) -> io::Result<()> {
    let mut encoded = serde_json::to_string(reply)?;
    encoded.push('\n');
    output.write_all(encoded.as_bytes()).await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllerConfig, RateLimitConfig, SessionConfig};
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::BufReader;

    fn offline_controller() -> Arc<Controller> {
        Arc::new(Controller::new(ControllerConfig {
            session: SessionConfig::new("127.0.0.1:1"),
            rate_limit: RateLimitConfig {
                calls: 10,
                period: Duration::from_secs(1),
                enabled: false,
            },
            join_settle: Duration::ZERO,
            ..ControllerConfig::default()
        }))
    }

    fn decode_replies(output: Vec<u8>) -> Vec<Reply> {
        let mut replies: Vec<Reply> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        replies.sort_by_key(|reply| reply.id.as_i64().unwrap_or(-1));
        replies
    }

    async fn drive(input: &[u8]) -> Vec<Reply> {
        let mut output = Vec::new();
        run(offline_controller(), BufReader::new(input), &mut output)
            .await
            .unwrap();
        decode_replies(output)
    }

    #[test]
    fn test_parse_tool_calls() {
        assert_eq!(
            ToolCall::parse("move_to", json!({"x": 700, "y": 300.5})).unwrap(),
            ToolCall::MoveTo { x: 700.0, y: 300.5 }
        );
        assert_eq!(
            ToolCall::parse("join_game", json!({"player_name": "Scout", "team": "red"})).unwrap(),
            ToolCall::Join {
                name: "Scout".to_string(),
                team: "red".to_string()
            }
        );
        assert_eq!(ToolCall::parse("attack", Value::Null).unwrap(), ToolCall::Attack);
        assert_eq!(
            ToolCall::parse("disconnect", json!({})).unwrap(),
            ToolCall::Disconnect
        );
    }

    #[test]
    fn test_parse_rejects_bad_requests() {
        assert!(matches!(
            ToolCall::parse("fly", json!({})),
            Err(RequestError::UnknownTool(tool)) if tool == "fly"
        ));
        assert!(matches!(
            ToolCall::parse("move_to", json!({"x": 10})),
            Err(RequestError::InvalidArgs { .. })
        ));
        assert!(matches!(
            ToolCall::parse("send_team_message", Value::Null),
            Err(RequestError::InvalidArgs { .. })
        ));
    }

    #[test]
    fn test_parse_line_defaults_session() {
        let (id, session, call) = parse_line(r#"{"id":7,"tool":"attack"}"#).unwrap();
        assert_eq!(id, json!(7));
        assert_eq!(session, DEFAULT_SESSION);
        assert_eq!(call, ToolCall::Attack);

        let (_, session, _) = parse_line(r#"{"id":8,"session":"blue-1","tool":"game_state"}"#).unwrap();
        assert_eq!(session, "blue-1");
    }

    #[test]
    fn test_parse_line_errors_keep_id() {
        let reply = parse_line("not json").unwrap_err();
        assert_eq!(reply.id, Value::Null);
        assert!(!reply.success);
        assert!(reply.text.starts_with("Error: malformed request"));

        let reply = parse_line(r#"{"id":3,"tool":"teleport"}"#).unwrap_err();
        assert_eq!(reply.id, json!(3));
        assert_eq!(reply.text, "Error: unknown tool 'teleport'");
    }

    #[tokio::test]
    async fn test_run_answers_every_line() {
        let input = concat!(
            "{\"id\":1,\"tool\":\"disconnect\"}\n",
            "\n",
            "{\"id\":2,\"tool\":\"move_to\",\"args\":{\"x\":700,\"y\":300}}\n",
            "garbage\n",
            "{\"id\":3,\"tool\":\"join\",\"args\":{\"name\":\"\",\"team\":\"red\"}}\n",
        );
        let replies = drive(input.as_bytes()).await;
        assert_eq!(replies.len(), 4);

        assert_eq!(replies[0].id, Value::Null);
        assert!(replies[0].text.contains("malformed request"));

        assert_eq!(replies[1].id, json!(1));
        assert!(replies[1].success);

        assert_eq!(replies[2].id, json!(2));
        assert_eq!(replies[2].text, "Error: you must join the game first");

        assert_eq!(replies[3].id, json!(3));
        assert_eq!(replies[3].text, "Error: player_name cannot be empty");
    }

    #[tokio::test]
    async fn test_run_with_empty_input() {
        assert!(drive(b"").await.is_empty());
    }

    #[tokio::test]
    async fn test_run_survives_invalid_utf8() {
        let input = b"{\"id\":1,\"tool\":\"disconnect\"}\n\xff\xfe\n{\"id\":2,\"tool\":\"attack\"}";
        let replies = drive(input).await;
        assert_eq!(replies.len(), 3);

        assert_eq!(replies[0].id, Value::Null);
        assert!(!replies[0].success);
        assert!(replies[0]
            .text
            .starts_with("Error: malformed request: input is not valid UTF-8"));

        assert_eq!(replies[1].id, json!(1));
        assert!(replies[1].success);

        // The last line has no trailing newline and still gets an answer
        assert_eq!(replies[2].id, json!(2));
        assert_eq!(replies[2].text, "Error: you must join the game first");
    }

    #[tokio::test]
    async fn test_read_error_still_answers_accepted_requests() {
        let input = tokio_test::io::Builder::new()
            .read(b"{\"id\":1,\"tool\":\"disconnect\"}\n")
            .read_error(io::Error::new(io::ErrorKind::BrokenPipe, "stdin went away"))
            .build();
        let controller = offline_controller();

        let mut output = Vec::new();
        let result = run(Arc::clone(&controller), BufReader::new(input), &mut output).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);

        let replies = decode_replies(output);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, json!(1));
        assert!(replies[0].success);
        assert_eq!(controller.session_count(), 0);
    }
}
