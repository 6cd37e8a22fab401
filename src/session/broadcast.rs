//! 방 브로드캐스트

use super::registry::Member;
use crate::protocol::ServerMessage;

/// 멤버 목록 순서대로 전송. 한 연결의 실패가 나머지 전송을 막지 않는다.
pub fn fan_out(match_name: &str, members: &[Member], message: &ServerMessage) -> usize {
    let mut delivered = 0;
    for member in members {
        match member.sender.send(message.clone()) {
            Ok(()) => delivered += 1,
            Err(_) => {
                tracing::debug!(
                    match_name = %match_name,
                    connection_id = %member.connection_id,
                    "Skipped closed connection during broadcast"
                );
            }
        }
    }
    delivered
}
