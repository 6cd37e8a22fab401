//! 매치메이킹 핸들러

use crate::domain::{self, JoinRejection, Match};
use crate::error::{JoinError, StoreError};
use crate::protocol::ServerMessage;
use crate::session::ClientSender;
use crate::state::AppState;

/// 자동 매칭 후보 재검증 횟수
const OPEN_MATCH_ATTEMPTS: usize = 5;
/// 시각 기반 이름 충돌 시 재시도 횟수
const NAME_ATTEMPTS: usize = 5;

/// 방 번호로 참여 (room_join)
pub async fn handle_room_join(
    state: &AppState,
    connection_id: &str,
    sender: &ClientSender,
    player_name: &str,
    room_id: &str,
) {
    let match_name = domain::room_match_name(room_id);
    tracing::info!(connection_id = %connection_id, match_name = %match_name, "handle_room_join started");

    match join_room(state, connection_id, sender, player_name, &match_name).await {
        Ok(players) => {
            tracing::info!(
                match_name = %match_name,
                player = %player_name.trim(),
                player_count = players.len(),
                "Player joined room"
            );
        }
        Err(err) => reject(sender, connection_id, &match_name, err),
    }
}

/// 빈 자리가 있는 매치를 찾거나 새로 생성 (join)
pub async fn handle_join(
    state: &AppState,
    connection_id: &str,
    sender: &ClientSender,
    player_name: &str,
) {
    match find_or_create_open_match(state, connection_id, sender, player_name).await {
        Ok(record) => {
            tracing::info!(
                match_name = %record.name,
                player = %player_name.trim(),
                player_count = record.players.len(),
                "Player joined open match"
            );
        }
        Err(err) => reject(sender, connection_id, "<open>", err),
    }
}

async fn join_room(
    state: &AppState,
    connection_id: &str,
    sender: &ClientSender,
    player_name: &str,
    match_name: &str,
) -> Result<Vec<String>, JoinError> {
    let player_name = validated_name(player_name)?;

    let previous = state.sessions.match_of(connection_id);
    if previous.as_deref() == Some(match_name) {
        return resend_roster(state, sender, match_name).await;
    }

    let mut locked = vec![match_name];
    locked.extend(previous.as_deref());
    let _guards = state.sessions.lock_matches(&locked).await;

    // 참여 가능 여부를 먼저 확정한 뒤에만 이전 매치를 떠난다
    let mut existing = state.store.find_match_by_name(match_name).await?;
    if let Some(record) = existing.as_mut() {
        record
            .try_join(player_name, state.max_players())
            .map_err(rejection)?;
    }
    leave_previous(state, connection_id, sender, previous.as_deref()).await?;

    let record = match existing {
        None => {
            tracing::info!(match_name = %match_name, "Match created");
            state
                .store
                .create_match(match_name, vec![player_name.to_string()])
                .await?
        }
        Some(joined) => state.store.save_match(&joined).await?,
    };

    enroll(state, connection_id, sender, player_name, &record);
    Ok(record.players)
}

async fn find_or_create_open_match(
    state: &AppState,
    connection_id: &str,
    sender: &ClientSender,
    player_name: &str,
) -> Result<Match, JoinError> {
    let player_name = validated_name(player_name)?;
    let previous = state.sessions.match_of(connection_id);

    let max_players = state.max_players();
    let _matchmaking = state.sessions.lock_matchmaking().await;

    for _ in 0..OPEN_MATCH_ATTEMPTS {
        let leaving = previous.clone();
        let candidate = state
            .store
            .find_open_match(&move |m: &Match| {
                m.is_open_for_matchmaking(max_players) && leaving.as_deref() != Some(m.name.as_str())
            })
            .await?;
        let Some(candidate) = candidate else {
            break;
        };

        let mut locked = vec![candidate.name.as_str()];
        locked.extend(previous.as_deref());
        let _guards = state.sessions.lock_matches(&locked).await;
        // 잠금을 기다리는 동안 방 번호 참여나 이탈로 바뀌었을 수 있다
        let Some(mut current) = state.store.find_match_by_name(&candidate.name).await? else {
            continue;
        };
        if !current.is_open_for_matchmaking(max_players) {
            continue;
        }

        current.try_join(player_name, max_players).map_err(rejection)?;
        leave_previous(state, connection_id, sender, previous.as_deref()).await?;
        let saved = state.store.save_match(&current).await?;
        enroll(state, connection_id, sender, player_name, &saved);
        return Ok(saved);
    }

    create_open_match(state, connection_id, sender, player_name, previous.as_deref()).await
}

async fn create_open_match(
    state: &AppState,
    connection_id: &str,
    sender: &ClientSender,
    player_name: &str,
    previous: Option<&str>,
) -> Result<Match, JoinError> {
    let mut stamp = domain::now_millis();
    let mut last_err = None;

    for _ in 0..NAME_ATTEMPTS {
        let name = format!("{}{}", domain::MATCH_PREFIX, stamp);
        stamp += 1;

        let mut locked = vec![name.as_str()];
        locked.extend(previous);
        let _guards = state.sessions.lock_matches(&locked).await;
        if state.store.find_match_by_name(&name).await?.is_some() {
            last_err = Some(StoreError::AlreadyExists(name.clone()));
            continue;
        }

        leave_previous(state, connection_id, sender, previous).await?;
        match state
            .store
            .create_match(&name, vec![player_name.to_string()])
            .await
        {
            Ok(record) => {
                tracing::info!(match_name = %name, "Match created");
                enroll(state, connection_id, sender, player_name, &record);
                return Ok(record);
            }
            Err(err @ StoreError::AlreadyExists(_)) => last_err = Some(err),
            Err(err) => return Err(err.into()),
        }
    }

    Err(last_err
        .unwrap_or_else(|| StoreError::Unavailable("no match name available".into()))
        .into())
}

/// 다른 매치로 옮기기 전 이전 매치 이탈. 두 매치의 잠금을 모두 잡은 상태에서 호출한다.
///
/// 이탈 저장에 실패하면 연결은 이전 매치에 그대로 남고 참여는 중단된다.
async fn leave_previous(
    state: &AppState,
    connection_id: &str,
    sender: &ClientSender,
    previous: Option<&str>,
) -> Result<(), JoinError> {
    if let Some(previous) = previous {
        super::connection::depart_locked(state, connection_id, previous, Some(sender)).await?;
    }
    Ok(())
}

/// 레지스트리에 등록하고 로스터 브로드캐스트. 저장 성공 후에만 호출한다.
fn enroll(
    state: &AppState,
    connection_id: &str,
    sender: &ClientSender,
    player_name: &str,
    record: &Match,
) {
    state
        .sessions
        .add(&record.name, connection_id, player_name, sender.clone());
    state.sessions.broadcast(
        &record.name,
        ServerMessage::Update {
            match_name: record.name.clone(),
            players: record.players.clone(),
        },
    );
}

async fn resend_roster(
    state: &AppState,
    sender: &ClientSender,
    match_name: &str,
) -> Result<Vec<String>, JoinError> {
    let _guard = state.sessions.lock_match(match_name).await;
    let players = state
        .store
        .find_match_by_name(match_name)
        .await?
        .map(|m| m.players)
        .unwrap_or_default();
    let _ = sender.send(ServerMessage::Update {
        match_name: match_name.to_string(),
        players: players.clone(),
    });
    Ok(players)
}

fn validated_name(player_name: &str) -> Result<&str, JoinError> {
    let trimmed = player_name.trim();
    if trimmed.is_empty() {
        Err(JoinError::MissingPlayerName)
    } else {
        Ok(trimmed)
    }
}

fn rejection(reason: JoinRejection) -> JoinError {
    match reason {
        JoinRejection::Full => JoinError::RoomFull,
        JoinRejection::Finished => JoinError::AlreadyFinished,
    }
}

fn reject(sender: &ClientSender, connection_id: &str, match_name: &str, err: JoinError) {
    match &err {
        JoinError::Store(cause) => {
            tracing::error!(
                connection_id = %connection_id,
                match_name = %match_name,
                error = %cause,
                "Failed to persist join"
            );
        }
        _ => {
            tracing::warn!(
                connection_id = %connection_id,
                match_name = %match_name,
                reason = %err,
                "Join rejected"
            );
        }
    }
    let _ = sender.send(ServerMessage::error(err.to_string()));
}
