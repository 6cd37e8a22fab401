//! 연결 핸들러

use crate::domain::DepartureOutcome;
use crate::error::StoreError;
use crate::protocol::ServerMessage;
use crate::session::{ClientSender, ConnectionId, Departure};
use crate::state::AppState;
use uuid::Uuid;

/// 새 연결 처리
pub fn handle_connection() -> ConnectionId {
    let connection_id = Uuid::new_v4().to_string();
    tracing::info!(connection_id = %connection_id, "New connection established");
    connection_id
}

/// 연결 해제 처리
pub async fn handle_disconnect(state: &AppState, connection_id: &str) {
    let outcome = depart(state, connection_id).await;
    tracing::info!(connection_id = %connection_id, outcome = ?outcome, "Connection closed");
}

/// 연결 해제에 따른 이탈. 저장에 실패해도 끊긴 연결은 레지스트리에서 뺀다.
pub async fn depart(state: &AppState, connection_id: &str) -> Option<DepartureOutcome> {
    let match_name = state.sessions.match_of(connection_id)?;
    let _guard = state.sessions.lock_match(&match_name).await;

    match depart_locked(state, connection_id, &match_name, None).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(match_name = %match_name, error = %err, "Failed to persist departure");
            None
        }
    }
}

/// 현재 매치에서 연결을 빼고 로스터/승자 상태를 맞춘다.
///
/// 호출자는 `match_name`의 매치 잠금을 잡고 있어야 한다. `restore_to`가 주어지면
/// 저장 실패 시 연결을 원래 자리에 되돌리고 오류를 반환한다.
pub(crate) async fn depart_locked(
    state: &AppState,
    connection_id: &str,
    match_name: &str,
    restore_to: Option<&ClientSender>,
) -> Result<Option<DepartureOutcome>, StoreError> {
    if state.sessions.match_of(connection_id).as_deref() != Some(match_name) {
        return Ok(None);
    }
    let Some(departure) = state.sessions.remove_by_connection(connection_id) else {
        return Ok(None);
    };

    let record = match state.store.find_match_by_name(match_name).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            retire_if_empty(state, match_name);
            return Ok(None);
        }
        Err(err) => return Err(undo_departure(state, connection_id, &departure, restore_to, err)),
    };

    let mut updated = record;
    let outcome = updated.remove_player(&departure.player_name, departure.index);

    match &outcome {
        DepartureOutcome::AlreadyFinished | DepartureOutcome::NotOnRoster => {
            retire_if_empty(state, match_name);
            return Ok(Some(outcome));
        }
        DepartureOutcome::RosterShrunk
        | DepartureOutcome::DepletionWinner(_)
        | DepartureOutcome::Emptied => {}
    }

    if let Err(err) = state.store.save_match(&updated).await {
        return Err(undo_departure(state, connection_id, &departure, restore_to, err));
    }

    match &outcome {
        DepartureOutcome::RosterShrunk => {
            state.sessions.broadcast(
                match_name,
                ServerMessage::Update {
                    match_name: match_name.to_string(),
                    players: updated.players.clone(),
                },
            );
        }
        DepartureOutcome::DepletionWinner(winner) => {
            tracing::info!(match_name = %match_name, winner = %winner, "Match ended by disconnection");
            state.sessions.broadcast(
                match_name,
                ServerMessage::Winner {
                    winner: winner.clone(),
                },
            );
            state.sessions.clear(match_name);
        }
        DepartureOutcome::Emptied => {
            state.sessions.clear(match_name);
        }
        DepartureOutcome::AlreadyFinished | DepartureOutcome::NotOnRoster => {}
    }

    tracing::info!(
        match_name = %match_name,
        player = %departure.player_name,
        remaining = updated.players.len(),
        "Player left match"
    );
    Ok(Some(outcome))
}

fn undo_departure(
    state: &AppState,
    connection_id: &str,
    departure: &Departure,
    restore_to: Option<&ClientSender>,
    err: StoreError,
) -> StoreError {
    match restore_to {
        Some(sender) => state.sessions.restore(departure, connection_id, sender.clone()),
        None => retire_if_empty(state, &departure.match_name),
    }
    err
}

fn retire_if_empty(state: &AppState, match_name: &str) {
    if state.sessions.member_count(match_name) == 0 {
        state.sessions.clear(match_name);
    }
}
