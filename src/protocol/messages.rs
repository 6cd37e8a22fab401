//! 클라이언트-서버 메시지 프로토콜 정의

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 방 번호 (클라이언트가 문자열 또는 숫자로 보냄)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RoomId {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::Text(s) => f.write_str(s),
            // 정수값 실수는 정수로 표기 (5.0 → "5")
            RoomId::Number(n) => match n.as_f64() {
                Some(value) if n.is_f64() => {
                    let value = if value == 0.0 { 0.0 } else { value };
                    write!(f, "{}", value)
                }
                _ => write!(f, "{}", n),
            },
        }
    }
}

/// 클라이언트 → 서버 메시지
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    // Matchmaking
    #[serde(rename_all = "camelCase")]
    RoomJoin { player_name: String, room_id: RoomId },
    #[serde(rename_all = "camelCase")]
    Join { player_name: String },

    // Race
    #[serde(rename_all = "camelCase")]
    Progress {
        match_name: String,
        player_name: String,
        progress: Value,
        wpm: Value,
    },
    #[serde(rename_all = "camelCase")]
    Winner { match_name: String, winner: String },
}

/// 서버 → 클라이언트 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Update {
        #[serde(rename = "match")]
        match_name: String,
        players: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Progress {
        player_name: String,
        progress: Value,
        wpm: Value,
    },
    Winner {
        winner: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
