//! 관리용 HTTP 핸들러와 보존 기간 정리

use crate::domain::{self, now_millis};
use crate::protocol::RoomId;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRoomRequest {
    pub room_id: RoomId,
}

/// 매치 조회
pub async fn get_match_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.store.find_match_by_name(&name).await {
        Ok(Some(record)) => (StatusCode::OK, Json(json!(record))),
        Ok(None) => not_found(),
        Err(err) => store_failure(&name, err),
    }
}

/// 매치 삭제
pub async fn delete_match_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> (StatusCode, Json<Value>) {
    let _guard = state.sessions.lock_match(&name).await;
    match state.store.delete_match(&name).await {
        Ok(true) => {
            state.sessions.clear(&name);
            tracing::info!(match_name = %name, "Match deleted");
            (
                StatusCode::OK,
                Json(json!({ "success": true, "message": "Match deleted" })),
            )
        }
        Ok(false) => not_found(),
        Err(err) => store_failure(&name, err),
    }
}

/// 방 존재 여부 확인
pub async fn check_room_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckRoomRequest>,
) -> (StatusCode, Json<Value>) {
    let name = domain::room_match_name(&request.room_id.to_string());
    match state.store.find_match_by_name(&name).await {
        Ok(Some(_)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Room Found , joining" })),
        ),
        Ok(None) => not_found(),
        Err(err) => store_failure(&name, err),
    }
}

/// 보존 기간이 지난 종료 매치 정리.
///
/// 후보마다 매치 잠금을 잡고 다시 읽어, 그 사이 되살아난 매치는 건너뛴다.
pub async fn cleanup_finished_matches(state: &AppState) -> usize {
    let retention_ms = state.config.matches.retention().as_millis() as u64;
    let cutoff = now_millis().saturating_sub(retention_ms);

    let candidates = match state.store.find_expired(cutoff).await {
        Ok(candidates) => candidates,
        Err(err) => {
            tracing::error!(error = %err, "Failed to list expired matches");
            Vec::new()
        }
    };

    let mut deleted = 0;
    for candidate in candidates {
        if purge_expired(state, &candidate.name, cutoff).await {
            deleted += 1;
        }
    }

    let pruned_locks = state.sessions.prune_locks();
    if deleted > 0 || pruned_locks > 0 {
        tracing::info!(
            deleted_matches = deleted,
            pruned_locks = pruned_locks,
            "Cleanup completed"
        );
    }
    deleted
}

async fn purge_expired(state: &AppState, name: &str, cutoff: u64) -> bool {
    let _guard = state.sessions.lock_match(name).await;

    match state.store.find_match_by_name(name).await {
        Ok(Some(record)) if record.is_expired(cutoff) => {}
        Ok(_) => return false,
        Err(err) => {
            tracing::error!(match_name = %name, error = %err, "Failed to load expired match");
            return false;
        }
    }

    match state.store.delete_match(name).await {
        Ok(true) => {
            state.sessions.clear(name);
            tracing::info!(match_name = %name, "Cleaned up finished match");
            true
        }
        Ok(false) => false,
        Err(err) => {
            tracing::error!(match_name = %name, error = %err, "Failed to delete expired match");
            false
        }
    }
}

fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "message": "Match not found" })),
    )
}

fn store_failure(name: &str, err: crate::error::StoreError) -> (StatusCode, Json<Value>) {
    tracing::error!(match_name = %name, error = %err, "Store request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "message": "An error occurred." })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handlers::handle_room_join;
    use crate::handlers::testing::{stored, test_state, TestClient};
    use crate::store::InMemoryMatchStore;
    use std::time::Duration;

    fn expiring_state() -> Arc<AppState> {
        let config = Config::from_lookup(|key| match key {
            "MATCH_RETENTION_SECS" => Some("0".to_string()),
            _ => None,
        });
        Arc::new(AppState::new(config, Arc::new(InMemoryMatchStore::new())))
    }

    #[tokio::test]
    async fn test_delete_match_clears_registry() {
        let state = test_state();
        let client = TestClient::new();
        handle_room_join(&state, &client.id, &client.sender, "P1", "5").await;
        assert!(state.sessions.is_tracked("Match-5"));

        let (status, _) =
            delete_match_handler(State(state.clone()), Path("Match-5".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.sessions.is_tracked("Match-5"));
        assert!(state.sessions.match_of(&client.id).is_none());

        let (status, Json(body)) =
            delete_match_handler(State(state.clone()), Path("Match-5".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Match not found");
    }

    #[tokio::test]
    async fn test_check_room_and_get_match() {
        let state = test_state();
        let client = TestClient::new();
        handle_room_join(&state, &client.id, &client.sender, "P1", "77").await;

        let request: CheckRoomRequest = serde_json::from_value(json!({ "roomId": 77 })).unwrap();
        let (status, _) = check_room_handler(State(state.clone()), Json(request)).await;
        assert_eq!(status, StatusCode::OK);

        let request: CheckRoomRequest = serde_json::from_value(json!({ "roomId": "78" })).unwrap();
        let (status, _) = check_room_handler(State(state.clone()), Json(request)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, Json(body)) =
            get_match_handler(State(state.clone()), Path("Match-77".to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["players"], json!(["P1"]));
        assert_eq!(body["winner"], Value::Null);
    }

    #[tokio::test]
    async fn test_cleanup_purges_only_expired_finished_matches() {
        let state = expiring_state();

        let mut done = state
            .store
            .create_match("Match-done", vec!["P1".into()])
            .await
            .unwrap();
        done.winner = Some("P1".into());
        done.created_at = 1;
        state.store.save_match(&done).await.unwrap();
        let mut live = state
            .store
            .create_match("Match-live", vec!["P2".into()])
            .await
            .unwrap();
        live.created_at = 1;
        state.store.save_match(&live).await.unwrap();

        drop(state.sessions.lock_match("Match-idle").await);

        assert_eq!(cleanup_finished_matches(&state).await, 1);
        assert!(state.store.find_match_by_name("Match-done").await.unwrap().is_none());
        assert!(state.store.find_match_by_name("Match-live").await.unwrap().is_some());
        assert_eq!(cleanup_finished_matches(&state).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cleanup_waits_for_match_lock_and_rechecks() {
        let state = expiring_state();
        let mut empty = state
            .store
            .create_match("Match-9", vec![])
            .await
            .unwrap();
        empty.created_at = 1;
        let empty = state.store.save_match(&empty).await.unwrap();

        let guard = state.sessions.lock_match("Match-9").await;
        let cleanup = {
            let state = state.clone();
            tokio::spawn(async move { cleanup_finished_matches(&state).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!cleanup.is_finished());

        // 잠금을 쥔 쪽이 빈 매치를 되살린다
        let mut revived = empty;
        revived.players.push("P1".into());
        state.store.save_match(&revived).await.unwrap();
        drop(guard);

        assert_eq!(cleanup.await.unwrap(), 0);
        assert_eq!(stored(&state, "Match-9").await.players, vec!["P1"]);
    }
}
