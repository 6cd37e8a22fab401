//! 세션 매니저: 연결 레지스트리, 매치별 잠금, 브로드캐스트

pub mod broadcast;
pub mod locks;
pub mod registry;

pub use registry::{Departure, Member};

use crate::protocol::ServerMessage;
use locks::MatchLocks;
use registry::ConnectionRegistry;
use tokio::sync::{mpsc::UnboundedSender, Mutex, MutexGuard, OwnedMutexGuard};

pub type ConnectionId = String;
pub type ClientSender = UnboundedSender<ServerMessage>;

/// 실시간 방 상태의 단일 소유자.
///
/// 레지스트리는 이 타입의 연산으로만 접근한다.
#[derive(Default)]
pub struct SessionManager {
    registry: ConnectionRegistry,
    locks: MatchLocks,
    matchmaking: Mutex<()>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 매치 배타 구간 진입
    pub async fn lock_match(&self, match_name: &str) -> OwnedMutexGuard<()> {
        self.locks.acquire(match_name).await
    }

    /// 두 매치 이상을 함께 잠글 때 사용 (이름순)
    pub async fn lock_matches(&self, match_names: &[&str]) -> Vec<OwnedMutexGuard<()>> {
        self.locks.acquire_many(match_names).await
    }

    /// 자동 매칭 검색/생성 구간 진입 (잠금 순서: 자동 매칭 → 매치)
    pub async fn lock_matchmaking(&self) -> MutexGuard<'_, ()> {
        self.matchmaking.lock().await
    }

    pub fn add(&self, match_name: &str, connection_id: &str, player_name: &str, sender: ClientSender) {
        self.registry.add(
            match_name,
            Member {
                connection_id: connection_id.to_string(),
                player_name: player_name.to_string(),
                sender,
            },
        );
        tracing::debug!(
            match_name = %match_name,
            connection_id = %connection_id,
            members = self.registry.len(match_name),
            "Connection registered"
        );
    }

    pub fn remove_by_connection(&self, connection_id: &str) -> Option<Departure> {
        self.registry.remove_by_connection(connection_id)
    }

    /// 저장 실패로 취소된 이탈을 되돌린다
    pub fn restore(&self, departure: &Departure, connection_id: &str, sender: ClientSender) {
        self.registry.reinsert(
            &departure.match_name,
            departure.index,
            Member {
                connection_id: connection_id.to_string(),
                player_name: departure.player_name.clone(),
                sender,
            },
        );
        tracing::debug!(
            match_name = %departure.match_name,
            connection_id = %connection_id,
            "Connection restored"
        );
    }

    pub fn clear(&self, match_name: &str) -> usize {
        let cleared = self.registry.clear(match_name).len();
        if cleared > 0 {
            tracing::debug!(match_name = %match_name, cleared, "Match retired from registry");
        }
        cleared
    }

    pub fn match_of(&self, connection_id: &str) -> Option<String> {
        self.registry.match_of(connection_id)
    }

    pub fn is_tracked(&self, match_name: &str) -> bool {
        self.registry.is_tracked(match_name)
    }

    pub fn member_count(&self, match_name: &str) -> usize {
        self.registry.len(match_name)
    }

    #[allow(dead_code)]
    pub fn members(&self, match_name: &str) -> Vec<Member> {
        self.registry.members(match_name)
    }

    pub fn tracked_matches(&self) -> usize {
        self.registry.tracked_matches()
    }

    /// 방의 모든 연결에 전송, 전달된 수 반환
    pub fn broadcast(&self, match_name: &str, message: ServerMessage) -> usize {
        let members = self.registry.members(match_name);
        broadcast::fan_out(match_name, &members, &message)
    }

    /// 사용되지 않는 매치 잠금 정리
    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }
}
