use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const WORLD_WIDTH: f64 = 800.0;
pub const WORLD_HEIGHT: f64 = 600.0;
/// Nominal player speed in pixels per second (5 px per frame at ~16 fps)
pub const PLAYER_SPEED: f64 = 80.0;
pub const MAX_CHAT_LEN: usize = 200;
pub const MAX_NAME_LEN: usize = 20;

pub const RED_BASE: Point = Point { x: 50.0, y: 300.0 };
pub const BLUE_BASE: Point = Point { x: 750.0, y: 300.0 };

/// Fixed obstacle in the middle of the field
pub const WALL: Rect = Rect {
    left: 350.0,
    right: 450.0,
    top: 250.0,
    bottom: 350.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn in_world(&self) -> bool {
        (0.0..=WORLD_WIDTH).contains(&self.x) && (0.0..=WORLD_HEIGHT).contains(&self.y)
    }

    pub fn clamp_to_world(&self) -> Point {
        Point {
            x: self.x.clamp(0.0, WORLD_WIDTH),
            y: self.y.clamp(0.0, WORLD_HEIGHT),
        }
    }

    /// Point `max_step` units from `self` toward `target`, or `target` itself
    /// when it is already within reach. The result is kept inside the world.
    pub fn step_toward(&self, target: Point, max_step: f64) -> Point {
        let distance = self.distance_to(target);
        if distance <= max_step {
            return target;
        }

        let nx = (target.x - self.x) / distance;
        let ny = (target.y - self.y) / distance;
        Point {
            x: self.x + nx * max_step,
            y: self.y + ny * max_step,
        }
        .clamp_to_world()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Rect {
    /// Edges count as inside.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x <= self.right && point.y >= self.top && point.y <= self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub fn as_str(&self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Blue => "blue",
        }
    }

    pub fn base(&self) -> Point {
        match self {
            Team::Red => RED_BASE,
            Team::Blue => BLUE_BASE,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTeamError(pub String);

impl fmt::Display for ParseTeamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown team '{}', expected 'red' or 'blue'", self.0)
    }
}

impl std::error::Error for ParseTeamError {}

impl FromStr for Team {
    type Err = ParseTeamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "red" => Ok(Team::Red),
            "blue" => Ok(Team::Blue),
            other => Err(ParseTeamError(other.to_string())),
        }
    }
}

/// Frames sent from the controller to the game server over the websocket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ClientFrame {
    Join {
        id: String,
        name: String,
        team: Team,
    },
    Action {
        #[serde(rename = "playerId")]
        player_id: String,
        action: Command,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    Move { x: f64, y: f64 },
    Attack,
    Chat { message: String },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Move { .. } => "move",
            Command::Attack => "attack",
            Command::Chat { .. } => "chat",
        }
    }
}

/// Frames pushed by the game server: either a full state or an error notice
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    Error { message: String },
    State(Box<WorldSnapshot>),
}

pub fn decode_server_frame(text: &str) -> Result<ServerFrame, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;

    if value.get("type").and_then(Value::as_str) == Some("error") {
        let message = value
            .pointer("/data/message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        return Ok(ServerFrame::Error { message });
    }

    serde_json::from_value::<WorldSnapshot>(value).map(|state| ServerFrame::State(Box::new(state)))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub team: Team,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_true")]
    pub is_alive: bool,
    #[serde(default)]
    pub has_flag: bool,
    #[serde(default)]
    pub is_moving: bool,
    #[serde(default)]
    pub target_x: f64,
    #[serde(default)]
    pub target_y: f64,
    #[serde(default)]
    pub respawn_time: i64,
    #[serde(default)]
    pub spawn_protection: i64,
}

impl PlayerRecord {
    pub fn new(id: &str, name: &str, team: Team, position: Point) -> Self {
        Self {
            id: id.to_string(),
            x: position.x,
            y: position.y,
            team,
            name: name.to_string(),
            color: String::new(),
            is_alive: true,
            has_flag: false,
            is_moving: false,
            target_x: position.x,
            target_y: position.y,
            respawn_time: 0,
            spawn_protection: 0,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlagRecord {
    pub x: f64,
    pub y: f64,
    pub team: Option<Team>,
    pub is_at_base: bool,
    pub carrier: String,
    pub drop_time: i64,
}

impl Default for FlagRecord {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            team: None,
            is_at_base: true,
            carrier: String::new(),
            drop_time: 0,
        }
    }
}

impl FlagRecord {
    pub fn at_base(team: Team) -> Self {
        let base = match team {
            Team::Red => Point::new(100.0, 300.0),
            Team::Blue => Point::new(700.0, 300.0),
        };
        Self {
            x: base.x,
            y: base.y,
            team: Some(team),
            ..Self::default()
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// The carrying player's id, if anyone holds the flag.
    pub fn carrier(&self) -> Option<&str> {
        if self.carrier.is_empty() {
            None
        } else {
            Some(&self.carrier)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeamMessage {
    pub sender: String,
    pub message: String,
    /// Milliseconds since the unix epoch
    pub timestamp: i64,
    pub team: String,
}

/// Full point-in-time copy of the remote world
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub players: HashMap<String, PlayerRecord>,
    #[serde(deserialize_with = "null_as_default")]
    pub red_flag: FlagRecord,
    #[serde(deserialize_with = "null_as_default")]
    pub blue_flag: FlagRecord,
    pub red_score: u32,
    pub blue_score: u32,
    pub game_time: i64,
    pub game_started: bool,
    pub game_start_time: i64,
    pub game_duration: i64,
    pub game_ended: bool,
    pub winner: String,
    #[serde(deserialize_with = "null_as_default")]
    pub red_team_messages: Vec<TeamMessage>,
    #[serde(deserialize_with = "null_as_default")]
    pub blue_team_messages: Vec<TeamMessage>,
}

impl WorldSnapshot {
    pub fn player(&self, id: &str) -> Option<&PlayerRecord> {
        self.players.get(id)
    }

    pub fn flag(&self, team: Team) -> &FlagRecord {
        match team {
            Team::Red => &self.red_flag,
            Team::Blue => &self.blue_flag,
        }
    }

    pub fn score(&self, team: Team) -> u32 {
        match team {
            Team::Red => self.red_score,
            Team::Blue => self.blue_score,
        }
    }

    pub fn team_messages(&self, team: Team) -> &[TeamMessage] {
        match team {
            Team::Red => &self.red_team_messages,
            Team::Blue => &self.blue_team_messages,
        }
    }
}
