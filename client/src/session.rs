//! Connection to the game server: join handshake, push-stream ingestion,
//! fire-and-forget command sending and on-demand snapshot queries

use crate::config::SessionConfig;
use crate::error::{ControllerError, StateError, TransportError};
use crate::mirror::StateMirror;
use async_trait::async_trait;
use ctf_shared::{decode_server_frame, ClientFrame, Command, ServerFrame, Team, WorldSnapshot};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub player_id: String,
    pub name: String,
    pub team: Team,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Disconnected,
    Connecting,
    Joined,
}

/// What the action executor needs from a live game connection
#[async_trait]
pub trait GameLink: Send + Sync {
    /// Identity of the joined player, `None` unless the session is joined
    fn identity(&self) -> Option<Identity>;

    /// Queues one command frame; no acknowledgement is awaited
    async fn send(&self, command: Command) -> Result<(), TransportError>;

    /// Fetches a point-in-time snapshot over the request/response channel
    async fn query_snapshot(&self) -> Result<WorldSnapshot, TransportError>;

    /// Latest snapshot delivered by the push stream
    fn mirrored(&self) -> Option<Arc<WorldSnapshot>>;
}

#[derive(Default)]
struct Link {
    phase: Phase,
    /// Bumped on every connect and teardown so stale tasks leave newer links alone
    generation: u64,
    identity: Option<Identity>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    writer: Option<JoinHandle<()>>,
    ingest: Option<JoinHandle<()>>,
}

/// Owns one websocket connection to the game server and the mirror it feeds
pub struct ConnectionSession {
    config: SessionConfig,
    http: reqwest::Client,
    mirror: Arc<StateMirror>,
    last_error: Arc<Mutex<Option<String>>>,
    link: Arc<Mutex<Link>>,
}

impl ConnectionSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            mirror: Arc::new(StateMirror::new()),
            last_error: Arc::new(Mutex::new(None)),
            link: Arc::new(Mutex::new(Link::default())),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.link.lock().phase
    }

    pub fn is_joined(&self) -> bool {
        self.phase() == Phase::Joined
    }

    /// Whether the push stream is still attached
    pub fn is_streaming(&self) -> bool {
        self.link.lock().outbound.is_some()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn mirror(&self) -> Arc<StateMirror> {
        Arc::clone(&self.mirror)
    }

    /// Opens the websocket, sends the join frame and waits out the grace window.
    ///
    /// The server rejects joins (name taken, bad team) with an asynchronous
    /// error frame rather than closing the connection, so success here only
    /// means no rejection arrived within `join_grace`.
    pub async fn connect(&self, name: &str, team: Team) -> Result<String, ControllerError> {
        let generation = {
            let mut link = self.link.lock();
            if link.phase != Phase::Disconnected {
                let (name, team) = match &link.identity {
                    Some(identity) => (identity.name.clone(), identity.team.to_string()),
                    None => ("(joining)".to_string(), "pending".to_string()),
                };
                return Err(StateError::AlreadyJoined { name, team }.into());
            }
            link.phase = Phase::Connecting;
            link.generation += 1;
            link.generation
        };
        self.last_error.lock().take();

        let player_id = new_player_id();
        let url = self.config.ws_url();
        info!("Connecting to {} as {} ({} team)", url, name, team);

        let stream = match connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                self.teardown(Some(generation));
                return Err(TransportError::Connect(e.to_string()).into());
            }
        };
        let (mut ws_write, ws_read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = ws_write.send(message).await {
                    debug!("Websocket write failed: {}", e);
                    break;
                }
            }
            let _ = ws_write.close().await;
        });

        {
            let mut link = self.link.lock();
            link.outbound = Some(outbound_tx.clone());
            link.writer = Some(writer);
        }

        let ingest = tokio::spawn(run_ingest(
            ws_read,
            Arc::clone(&self.mirror),
            Arc::clone(&self.last_error),
            Arc::clone(&self.link),
            generation,
        ));
        self.link.lock().ingest = Some(ingest);

        let join = ClientFrame::Join {
            id: player_id.clone(),
            name: name.to_string(),
            team,
        };
        let sent = serde_json::to_string(&join)
            .map_err(TransportError::from)
            .and_then(|text| {
                outbound_tx
                    .send(Message::Text(text))
                    .map_err(|_| TransportError::Closed)
            });
        if let Err(e) = sent {
            self.teardown(Some(generation));
            return Err(e.into());
        }
        drop(outbound_tx);

        sleep(self.config.join_grace).await;

        let rejection = self.last_error.lock().take();
        if let Some(message) = rejection {
            warn!("Join as {} rejected: {}", name, message);
            self.teardown(Some(generation));
            return Err(ControllerError::RemoteRejection(message));
        }

        let stream_closed = {
            let mut link = self.link.lock();
            if link.generation != generation || link.phase != Phase::Connecting {
                // Torn down by a concurrent disconnect
                return Err(TransportError::Closed.into());
            }
            if link.outbound.is_none() {
                true
            } else {
                link.phase = Phase::Joined;
                link.identity = Some(Identity {
                    player_id: player_id.clone(),
                    name: name.to_string(),
                    team,
                });
                false
            }
        };

        if stream_closed {
            self.teardown(Some(generation));
            return Err(TransportError::Closed.into());
        }

        info!("Joined as {} ({})", name, player_id);
        Ok(player_id)
    }

    /// Closes the connection and clears identity and mirror. Safe to call repeatedly.
    pub fn disconnect(&self) -> Option<Identity> {
        let previous = self.link.lock().identity.clone();
        self.teardown(None);
        if let Some(identity) = &previous {
            info!("Disconnected {} ({})", identity.name, identity.player_id);
        }
        previous
    }

    pub async fn send(&self, command: Command) -> Result<(), TransportError> {
        let (player_id, outbound) = {
            let link = self.link.lock();
            let player_id = match (&link.phase, &link.identity) {
                (Phase::Joined, Some(identity)) => identity.player_id.clone(),
                _ => return Err(TransportError::NotConnected),
            };
            let outbound = link.outbound.clone().ok_or(TransportError::Closed)?;
            (player_id, outbound)
        };

        debug!("Sending {} for {}", command.kind(), player_id);
        let frame = ClientFrame::Action {
            player_id,
            action: command,
        };
        let text = serde_json::to_string(&frame)?;
        outbound
            .send(Message::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    pub async fn query_snapshot(&self) -> Result<WorldSnapshot, TransportError> {
        let response = self
            .http
            .get(self.config.http_url())
            .timeout(self.config.http_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }

        Ok(response.json::<WorldSnapshot>().await?)
    }

    /// Resets to `Disconnected`. With `expected` set, only acts if no newer
    /// connect or teardown happened in between.
    fn teardown(&self, expected: Option<u64>) {
        let (outbound, ingest) = {
            let mut link = self.link.lock();
            if let Some(generation) = expected {
                if link.generation != generation {
                    return;
                }
            }
            link.phase = Phase::Disconnected;
            link.generation += 1;
            link.identity = None;
            // The writer drains and closes the socket once its channel is gone
            link.writer = None;
            (link.outbound.take(), link.ingest.take())
        };

        drop(outbound);
        if let Some(ingest) = ingest {
            ingest.abort();
        }
        self.mirror.clear();
        self.last_error.lock().take();
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        let mut link = self.link.lock();
        link.outbound = None;
        if let Some(ingest) = link.ingest.take() {
            ingest.abort();
        }
    }
}

#[async_trait]
impl GameLink for ConnectionSession {
    fn identity(&self) -> Option<Identity> {
        let link = self.link.lock();
        match link.phase {
            Phase::Joined => link.identity.clone(),
            _ => None,
        }
    }

    async fn send(&self, command: Command) -> Result<(), TransportError> {
        ConnectionSession::send(self, command).await
    }

    async fn query_snapshot(&self) -> Result<WorldSnapshot, TransportError> {
        ConnectionSession::query_snapshot(self).await
    }

    fn mirrored(&self) -> Option<Arc<WorldSnapshot>> {
        self.mirror.snapshot()
    }
}

/// Reads server frames until the stream ends. Never reports to a caller:
/// failures show up as a stale mirror and an unset outbound handle.
async fn run_ingest(
    mut read: SplitStream<WsStream>,
    mirror: Arc<StateMirror>,
    last_error: Arc<Mutex<Option<String>>>,
    link: Arc<Mutex<Link>>,
    generation: u64,
) {
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                apply_frame(&text, &mirror, &last_error, &link, generation)
            }
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => apply_frame(&text, &mirror, &last_error, &link, generation),
                Err(_) => debug!("Skipping non-utf8 binary frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Game server stream error: {}", e);
                break;
            }
        }
    }

    debug!("Push stream for generation {} ended", generation);
    let mut link = link.lock();
    if link.generation == generation {
        link.outbound = None;
    }
}

/// Applies one frame unless the link has moved past `generation`. The link
/// lock is held across the write so a teardown cannot clear in between.
fn apply_frame(
    text: &str,
    mirror: &StateMirror,
    last_error: &Mutex<Option<String>>,
    link: &Mutex<Link>,
    generation: u64,
) {
    let frame = match decode_server_frame(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("Skipping undecodable frame: {}", e);
            return;
        }
    };

    let link = link.lock();
    if link.generation != generation {
        debug!("Dropping frame for stale generation {}", generation);
        return;
    }
    match frame {
        ServerFrame::Error { message } => {
            warn!("Game server error: {}", message);
            *last_error.lock() = Some(message);
        }
        ServerFrame::State(snapshot) => mirror.replace(*snapshot),
    }
}

fn new_player_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("player_{}", &hex[..8])
}
