//! Wire types: agent commands (HTTP) and spectator push messages (WebSocket)

use serde::{Deserialize, Serialize};

use crate::game::{ArenaKind, Snapshot};
use crate::scheduler::MatchStatus;
use crate::store::MatchResult;

/// One command per action request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentCommand {
    /// Growth arena: steer by absolute `angle` or relative `turn` (radians)
    Steer {
        angle: Option<f32>,
        turn: Option<f32>,
        boost: Option<bool>,
    },

    /// Combat arena: face `angle` or turn by `turn`, walking unless `moving` is false
    Move {
        angle: Option<f32>,
        turn: Option<f32>,
        moving: Option<bool>,
    },

    /// Fire the held weapon (melee when empty-handed), aimed at `angle`
    Shoot { angle: Option<f32> },

    Melee { angle: Option<f32> },

    /// Swap the held weapon for one in reach
    Pickup,

    /// Stand still
    Stop,
}

impl AgentCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Steer { .. } => "steer",
            Self::Move { .. } => "move",
            Self::Shoot { .. } => "shoot",
            Self::Melee { .. } => "melee",
            Self::Pickup => "pickup",
            Self::Stop => "stop",
        }
    }

    /// Arena the command belongs to
    pub fn arena(&self) -> ArenaKind {
        match self {
            Self::Steer { .. } => ArenaKind::Growth,
            _ => ArenaKind::Combat,
        }
    }
}

/// Messages sent from spectators
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpectatorMsg {
    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages pushed to spectators
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg<'a> {
    /// Sent once on connect
    Welcome {
        server_time: u64,
        status: &'a MatchStatus,
    },

    /// Throttled game state
    Snapshot(&'a Snapshot),

    LobbyOpen(&'a MatchStatus),

    StatusChanged(&'a MatchStatus),

    /// Final standings
    MatchEnd(&'a MatchResult),

    Pong {
        /// Echo back client timestamp
        t: u64,
        server_time: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_commands_parse_from_action_tag() {
        let steer: AgentCommand =
            serde_json::from_value(json!({ "action": "steer", "turn": 0.5, "boost": true })).unwrap();
        assert_eq!(
            steer,
            AgentCommand::Steer {
                angle: None,
                turn: Some(0.5),
                boost: Some(true)
            }
        );
        assert_eq!(steer.arena(), ArenaKind::Growth);

        let pickup: AgentCommand = serde_json::from_value(json!({ "action": "pickup" })).unwrap();
        assert_eq!(pickup, AgentCommand::Pickup);
        assert_eq!(pickup.arena(), ArenaKind::Combat);

        assert!(serde_json::from_value::<AgentCommand>(json!({ "action": "teleport" })).is_err());
    }

    #[test]
    fn test_snapshot_frame_is_tagged() {
        let snapshot = Snapshot::empty(uuid::Uuid::nil(), ArenaKind::Growth, 7);
        let value = serde_json::to_value(ServerMsg::Snapshot(&snapshot)).unwrap();
        assert_eq!(value["type"], "snapshot");
        assert_eq!(value["time_ms"], 7);
        assert_eq!(value["arena"], "growth");
    }
}
