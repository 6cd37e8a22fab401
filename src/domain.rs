//! 매치 엔티티와 상태 전이 규칙
//!
//! 저장소나 연결 상태와 무관한 순수 로직만 담는다. 호출자는 매치별 잠금을
//! 잡은 상태에서 읽기-결정-쓰기를 수행해야 한다.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// 명시적 방 이름 접두사
pub const MATCH_PREFIX: &str = "Match-";

/// 방 번호로 매치 이름 생성
pub fn room_match_name(room_id: &str) -> String {
    format!("{}{}", MATCH_PREFIX, room_id.trim())
}

/// 현재 시각 (unix millis)
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// 영속 매치 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub name: String,
    pub players: Vec<String>,
    pub winner: Option<String>,
    pub created_at: u64,
    /// 저장 성공 시마다 증가 (조건부 갱신용)
    pub version: u64,
}

/// 매치 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Open,
    Full,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinRejection {
    Full,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimRejection {
    AlreadyDecided { winner: String },
    NotOnRoster,
}

/// 플레이어 이탈 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartureOutcome {
    /// 두 명 이상 남음, 승자 없음
    RosterShrunk,
    /// 한 명만 남아 자동 승리
    DepletionWinner(String),
    /// 아무도 남지 않음
    Emptied,
    /// 이미 종료된 매치 (영속 레코드는 그대로 둔다)
    AlreadyFinished,
    /// 로스터에 없는 플레이어
    NotOnRoster,
}

impl Match {
    pub fn new(name: impl Into<String>, players: Vec<String>) -> Self {
        Self {
            name: name.into(),
            players,
            winner: None,
            created_at: now_millis(),
            version: 0,
        }
    }

    pub fn state(&self, max_players: usize) -> MatchState {
        if self.winner.is_some() {
            MatchState::Finished
        } else if self.players.len() >= max_players {
            MatchState::Full
        } else {
            MatchState::Open
        }
    }

    /// 자동 매칭 대상 여부: 1명 이상, 정원 미만, 승자 없음
    pub fn is_open_for_matchmaking(&self, max_players: usize) -> bool {
        !self.players.is_empty() && self.state(max_players) == MatchState::Open
    }

    /// 종료되었거나 비었고 `cutoff_millis` 이전에 생성된 매치
    pub fn is_expired(&self, cutoff_millis: u64) -> bool {
        let retired = self.winner.is_some() || self.players.is_empty();
        retired && self.created_at < cutoff_millis
    }

    pub fn has_player(&self, player_name: &str) -> bool {
        self.players.iter().any(|p| p == player_name)
    }

    pub fn try_join(&mut self, player_name: &str, max_players: usize) -> Result<(), JoinRejection> {
        match self.state(max_players) {
            MatchState::Finished => Err(JoinRejection::Finished),
            MatchState::Full => Err(JoinRejection::Full),
            MatchState::Open => {
                self.players.push(player_name.to_string());
                Ok(())
            }
        }
    }

    /// 명시적 완료 선언. 승자는 한 번만 정해진다.
    pub fn claim_winner(&mut self, claimed: &str) -> Result<(), ClaimRejection> {
        if let Some(winner) = &self.winner {
            return Err(ClaimRejection::AlreadyDecided {
                winner: winner.clone(),
            });
        }
        if !self.has_player(claimed) {
            return Err(ClaimRejection::NotOnRoster);
        }
        self.winner = Some(claimed.to_string());
        Ok(())
    }

    /// 연결 해제에 따른 로스터 변경.
    ///
    /// `index_hint`는 등록 순서상의 위치로, 같은 이름이 여러 번 있을 때
    /// 어느 항목을 지울지 정하는 데만 쓴다.
    pub fn remove_player(&mut self, player_name: &str, index_hint: usize) -> DepartureOutcome {
        if self.winner.is_some() {
            return DepartureOutcome::AlreadyFinished;
        }

        let position = match self.players.get(index_hint) {
            Some(p) if p == player_name => Some(index_hint),
            _ => self.players.iter().position(|p| p == player_name),
        };
        let Some(position) = position else {
            return DepartureOutcome::NotOnRoster;
        };
        self.players.remove(position);

        match self.players.len() {
            0 => DepartureOutcome::Emptied,
            1 => {
                let remaining = self.players[0].clone();
                self.winner = Some(remaining.clone());
                DepartureOutcome::DepletionWinner(remaining)
            }
            _ => DepartureOutcome::RosterShrunk,
        }
    }
}
