//! 레이스 진행/완료 핸들러

use crate::domain::ClaimRejection;
use crate::protocol::ServerMessage;
use crate::session::ClientSender;
use crate::state::AppState;
use serde_json::Value;

/// 진행 상황 중계. 저장하지 않으며 값도 검증하지 않는다.
pub fn handle_progress(
    state: &AppState,
    match_name: &str,
    player_name: &str,
    progress: Value,
    wpm: Value,
) -> usize {
    if !state.sessions.is_tracked(match_name) {
        tracing::debug!(match_name = %match_name, "Progress for untracked match dropped");
        return 0;
    }

    state.sessions.broadcast(
        match_name,
        ServerMessage::Progress {
            player_name: player_name.to_string(),
            progress,
            wpm,
        },
    )
}

/// 명시적 완료 선언 처리
pub async fn handle_winner_claim(
    state: &AppState,
    connection_id: &str,
    sender: &ClientSender,
    match_name: &str,
    claimed: &str,
) {
    if !state.sessions.is_tracked(match_name) {
        tracing::debug!(match_name = %match_name, "Winner claim for untracked match dropped");
        return;
    }

    let _guard = state.sessions.lock_match(match_name).await;

    if state.sessions.match_of(connection_id).as_deref() != Some(match_name) {
        tracing::warn!(
            connection_id = %connection_id,
            match_name = %match_name,
            "Winner claim from non-member ignored"
        );
        return;
    }

    let mut record = match state.store.find_match_by_name(match_name).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::debug!(match_name = %match_name, "Winner claim for missing match dropped");
            return;
        }
        Err(err) => {
            tracing::error!(match_name = %match_name, error = %err, "Failed to load match for winner claim");
            let _ = sender.send(ServerMessage::error("Failed to record winner"));
            return;
        }
    };

    match record.claim_winner(claimed) {
        Ok(()) => {}
        Err(ClaimRejection::AlreadyDecided { winner }) => {
            tracing::info!(
                match_name = %match_name,
                winner = %winner,
                claimed = %claimed,
                "Winner already decided, claim ignored"
            );
            return;
        }
        Err(ClaimRejection::NotOnRoster) => {
            tracing::warn!(match_name = %match_name, claimed = %claimed, "Winner claim for unknown player ignored");
            return;
        }
    }

    if let Err(err) = state.store.save_match(&record).await {
        tracing::error!(match_name = %match_name, error = %err, "Failed to persist winner");
        let _ = sender.send(ServerMessage::error("Failed to record winner"));
        return;
    }

    state.sessions.broadcast(
        match_name,
        ServerMessage::Winner {
            winner: claimed.to_string(),
        },
    );
    tracing::info!(match_name = %match_name, winner = %claimed, "Match finished");
}
