//! 환경 변수 기반 설정 관리

use std::env;
use std::time::Duration;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub matches: MatchConfig,
    pub log_level: String,
}

/// 매치 설정
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub max_players: usize,
    pub retention_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl MatchConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 임의의 키-값 조회 함수로 설정 구성
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        let max_players = match parsed("MAX_PLAYERS", 3) {
            0 => 3,
            n => n as usize,
        };

        Self {
            port: lookup("PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(5000),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            cors_origins: lookup("CORS_ORIGINS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            matches: MatchConfig {
                max_players,
                retention_secs: parsed("MATCH_RETENTION_SECS", 86_400),
                cleanup_interval_secs: parsed("CLEANUP_INTERVAL_SECS", 300).max(1),
            },
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        }
    }

    /// 모든 오리진 허용 여부
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
