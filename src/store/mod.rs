//! 매치 영속 저장소 포트

pub mod memory;

pub use memory::InMemoryMatchStore;

use crate::domain::Match;
use crate::error::StoreError;
use async_trait::async_trait;

/// 자동 매칭 후보 판별 함수
pub type MatchFilter = dyn Fn(&Match) -> bool + Send + Sync;

/// 매치 레코드 저장소.
///
/// 서로 다른 매치 이름에 대한 호출은 동시에 안전해야 한다.
/// `save_match`는 읽어 온 `version`과 저장된 버전이 같을 때만 반영한다.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn find_match_by_name(&self, name: &str) -> Result<Option<Match>, StoreError>;

    /// 조건을 만족하는 가장 오래된 매치
    async fn find_open_match(
        &self,
        predicate: &MatchFilter,
    ) -> Result<Option<Match>, StoreError>;

    async fn create_match(&self, name: &str, players: Vec<String>) -> Result<Match, StoreError>;

    /// 저장 후 새 버전을 반영한 레코드 반환
    async fn save_match(&self, record: &Match) -> Result<Match, StoreError>;

    /// 삭제된 경우 `true`
    async fn delete_match(&self, name: &str) -> Result<bool, StoreError>;

    /// `cutoff_millis` 이전에 생성된 종료(또는 빈) 매치 목록. 삭제는 호출자가
    /// 매치 잠금을 잡고 `delete_match`로 한다.
    async fn find_expired(&self, cutoff_millis: u64) -> Result<Vec<Match>, StoreError>;
}
