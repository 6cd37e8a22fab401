//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::session::SessionManager;
use crate::store::MatchStore;
use std::sync::Arc;

/// 애플리케이션 상태
pub struct AppState {
    /// 실시간 방 상태
    pub sessions: SessionManager,
    /// 매치 저장소
    pub store: Arc<dyn MatchStore>,
    /// 설정
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn MatchStore>) -> Self {
        Self {
            sessions: SessionManager::new(),
            store,
            config: Arc::new(config),
        }
    }

    pub fn max_players(&self) -> usize {
        self.config.matches.max_players
    }
}
