//! Error taxonomy for the controller
//!
//! Argument and state errors are detected locally and never touch the network.
//! Transport errors and remote rejections always leave the session fully
//! disconnected before they reach the caller.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ArgumentError {
    #[error("player_name cannot be empty")]
    EmptyName,
    #[error("player_name must be at most {max} characters (got {len})")]
    NameTooLong { len: usize, max: usize },
    #[error("team must be 'red' or 'blue' (got '{0}')")]
    InvalidTeam(String),
    #[error("{axis} coordinate must be between 0 and {max} (got {value})")]
    OutOfBounds {
        axis: &'static str,
        value: f64,
        max: f64,
    },
    #[error("cannot move to ({x:.1}, {y:.1}) - position blocked by wall")]
    TargetInWall { x: f64, y: f64 },
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message too long ({len} characters, max {max})")]
    MessageTooLong { len: usize, max: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("you must join the game first")]
    NotJoined,
    #[error("already connected as {name} on {team} team; disconnect before joining again")]
    AlreadyJoined { name: String, team: String },
    #[error("player {0} not found in game state")]
    NotInWorld(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to game server: {0}")]
    Connect(String),
    #[error("not connected to game server")]
    NotConnected,
    #[error("connection to game server closed")]
    Closed,
    #[error("failed to get game state: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to get game state: server answered {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Argument(#[from] ArgumentError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("server rejected join: {0}")]
    RemoteRejection(String),
}

impl ControllerError {
    /// Short machine-friendly tag used in event log details
    pub fn tag(&self) -> &'static str {
        match self {
            ControllerError::Argument(ArgumentError::EmptyName) => "empty_name",
            ControllerError::Argument(ArgumentError::NameTooLong { .. }) => "name_too_long",
            ControllerError::Argument(ArgumentError::InvalidTeam(_)) => "invalid_team",
            ControllerError::Argument(ArgumentError::OutOfBounds { axis, .. }) => {
                if *axis == "x" {
                    "invalid_x_coordinate"
                } else {
                    "invalid_y_coordinate"
                }
            }
            ControllerError::Argument(ArgumentError::TargetInWall { .. }) => "blocked_by_wall",
            ControllerError::Argument(ArgumentError::EmptyMessage) => "empty_message",
            ControllerError::Argument(ArgumentError::MessageTooLong { .. }) => "message_too_long",
            ControllerError::State(StateError::NotJoined) => "not_connected",
            ControllerError::State(StateError::AlreadyJoined { .. }) => "already_connected",
            ControllerError::State(StateError::NotInWorld(_)) => "player_not_found",
            ControllerError::Transport(_) => "transport_error",
            ControllerError::RemoteRejection(_) => "remote_rejection",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_messages() {
        let err = ArgumentError::OutOfBounds {
            axis: "x",
            value: -1.0,
            max: 800.0,
        };
        assert_eq!(
            err.to_string(),
            "x coordinate must be between 0 and 800 (got -1)"
        );
        assert_eq!(
            ArgumentError::MessageTooLong { len: 201, max: 200 }.to_string(),
            "message too long (201 characters, max 200)"
        );
    }

    #[test]
    fn test_tags() {
        let x: ControllerError = ArgumentError::OutOfBounds {
            axis: "x",
            value: 900.0,
            max: 800.0,
        }
        .into();
        let y: ControllerError = ArgumentError::OutOfBounds {
            axis: "y",
            value: 601.0,
            max: 600.0,
        }
        .into();
        assert_eq!(x.tag(), "invalid_x_coordinate");
        assert_eq!(y.tag(), "invalid_y_coordinate");
        assert_eq!(
            ControllerError::from(StateError::NotJoined).tag(),
            "not_connected"
        );
        assert_eq!(
            ControllerError::RemoteRejection("taken".into()).tag(),
            "remote_rejection"
        );
    }
}
