//! 매치별 배타 구간

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 매치 이름별 비동기 뮤텍스 테이블.
///
/// 같은 매치에 대한 읽기-결정-쓰기는 직렬화되고, 다른 매치는 병렬로 진행된다.
#[derive(Default)]
pub struct MatchLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MatchLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, match_name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(match_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// 여러 매치를 이름순으로 잠근다. 두 개 이상을 잡는 경로는 모두 이 순서를 따른다.
    pub async fn acquire_many(&self, match_names: &[&str]) -> Vec<OwnedMutexGuard<()>> {
        let mut ordered = match_names.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for name in ordered {
            guards.push(self.acquire(name).await);
        }
        guards
    }

    /// 아무도 잡고 있지 않은 잠금 정리
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}
