//! 매치별 연결 레지스트리

use super::{ClientSender, ConnectionId};
use dashmap::DashMap;

/// 연결 멤버십 레코드
#[derive(Debug, Clone)]
pub struct Member {
    pub connection_id: ConnectionId,
    pub player_name: String,
    pub sender: ClientSender,
}

/// `remove_by_connection` 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub match_name: String,
    pub index: usize,
    pub player_name: String,
}

/// 매치 이름 → 참여 순서대로 정렬된 연결 목록
#[derive(Default)]
pub struct ConnectionRegistry {
    rooms: DashMap<String, Vec<Member>>,
    /// 연결 → 현재 매치
    memberships: DashMap<ConnectionId, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, match_name: &str, member: Member) {
        self.memberships
            .insert(member.connection_id.clone(), match_name.to_string());
        self.rooms
            .entry(match_name.to_string())
            .or_default()
            .push(member);
    }

    pub fn remove_by_connection(&self, connection_id: &str) -> Option<Departure> {
        let (_, match_name) = self.memberships.remove(connection_id)?;
        let mut members = self.rooms.get_mut(&match_name)?;
        let index = members
            .iter()
            .position(|m| m.connection_id == connection_id)?;
        let removed = members.remove(index);
        Some(Departure {
            match_name,
            index,
            player_name: removed.player_name,
        })
    }

    /// 제거했던 멤버를 원래 위치로 되돌린다
    pub fn reinsert(&self, match_name: &str, index: usize, member: Member) {
        self.memberships
            .insert(member.connection_id.clone(), match_name.to_string());
        let mut members = self.rooms.entry(match_name.to_string()).or_default();
        let index = index.min(members.len());
        members.insert(index, member);
    }

    /// 매치 항목 제거, 남아 있던 멤버 반환
    pub fn clear(&self, match_name: &str) -> Vec<Member> {
        let Some((_, members)) = self.rooms.remove(match_name) else {
            return Vec::new();
        };
        for member in &members {
            self.memberships
                .remove_if(&member.connection_id, |_, current| current == match_name);
        }
        members
    }

    pub fn match_of(&self, connection_id: &str) -> Option<String> {
        self.memberships.get(connection_id).map(|m| m.value().clone())
    }

    pub fn is_tracked(&self, match_name: &str) -> bool {
        self.rooms.contains_key(match_name)
    }

    pub fn len(&self, match_name: &str) -> usize {
        self.rooms.get(match_name).map(|m| m.len()).unwrap_or(0)
    }

    /// 현재 멤버 스냅샷 (락을 오래 잡지 않도록 복제)
    pub fn members(&self, match_name: &str) -> Vec<Member> {
        self.rooms
            .get(match_name)
            .map(|m| m.value().clone())
            .unwrap_or_default()
    }

    pub fn tracked_matches(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn member(id: &str, name: &str) -> Member {
        let (tx, _rx) = mpsc::unbounded_channel();
        Member {
            connection_id: id.to_string(),
            player_name: name.to_string(),
            sender: tx,
        }
    }

    #[test]
    fn test_add_keeps_join_order() {
        let registry = ConnectionRegistry::new();
        registry.add("Match-5", member("c1", "P1"));
        registry.add("Match-5", member("c2", "P2"));
        registry.add("Match-5", member("c3", "P3"));

        let names: Vec<_> = registry
            .members("Match-5")
            .into_iter()
            .map(|m| m.player_name)
            .collect();
        assert_eq!(names, vec!["P1", "P2", "P3"]);
        assert_eq!(registry.match_of("c2").as_deref(), Some("Match-5"));
    }

    #[test]
    fn test_remove_by_connection_reports_index_and_player() {
        let registry = ConnectionRegistry::new();
        registry.add("Match-5", member("c1", "P1"));
        registry.add("Match-5", member("c2", "P2"));
        registry.add("Match-5", member("c3", "P3"));

        let departure = registry.remove_by_connection("c2").unwrap();
        assert_eq!(
            departure,
            Departure {
                match_name: "Match-5".into(),
                index: 1,
                player_name: "P2".into(),
            }
        );
        assert_eq!(registry.len("Match-5"), 2);
        assert!(registry.match_of("c2").is_none());
    }

    #[test]
    fn test_remove_unknown_connection_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.add("Match-5", member("c1", "P1"));
        assert!(registry.remove_by_connection("nope").is_none());
        assert_eq!(registry.len("Match-5"), 1);
    }

    #[test]
    fn test_clear_drops_entry_and_memberships() {
        let registry = ConnectionRegistry::new();
        registry.add("Match-5", member("c1", "P1"));
        registry.add("Match-5", member("c2", "P2"));
        registry.add("Match-6", member("c3", "P3"));

        let cleared = registry.clear("Match-5");
        assert_eq!(cleared.len(), 2);
        assert!(!registry.is_tracked("Match-5"));
        assert!(registry.match_of("c1").is_none());
        assert!(registry.remove_by_connection("c1").is_none());
        assert_eq!(registry.tracked_matches(), 1);
        assert!(registry.clear("Match-5").is_empty());
    }

    #[test]
    fn test_reinsert_restores_position_and_membership() {
        let registry = ConnectionRegistry::new();
        registry.add("Match-5", member("c1", "P1"));
        registry.add("Match-5", member("c2", "P2"));
        registry.add("Match-5", member("c3", "P3"));

        let departure = registry.remove_by_connection("c2").unwrap();
        registry.reinsert(&departure.match_name, departure.index, member("c2", "P2"));

        let ids: Vec<_> = registry
            .members("Match-5")
            .into_iter()
            .map(|m| m.connection_id)
            .collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert_eq!(registry.match_of("c2").as_deref(), Some("Match-5"));

        // 비워져 사라진 항목도 다시 만든다
        registry.clear("Match-5");
        registry.reinsert("Match-5", 4, member("c1", "P1"));
        assert_eq!(registry.len("Match-5"), 1);
    }
}
