//! 에러 타입 정의

/// 저장소 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("match already exists: {0}")]
    AlreadyExists(String),

    #[error("match {name} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        name: String,
        expected: u64,
        found: u64,
    },

    #[error("match not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// 매치 참여 실패 사유 (요청한 연결에만 전달됨)
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("Room is full")]
    RoomFull,

    #[error("Match has already finished")]
    AlreadyFinished,

    #[error("Player name is required")]
    MissingPlayerName,

    #[error("Failed to join match")]
    Store(#[from] StoreError),
}
