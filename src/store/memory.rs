//! 인메모리 매치 저장소

use super::{MatchFilter, MatchStore};
use crate::domain::Match;
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// 프로세스 메모리에 매치를 보관하는 저장소
#[derive(Default)]
pub struct InMemoryMatchStore {
    matches: DashMap<String, Match>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.matches.len()
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn find_match_by_name(&self, name: &str) -> Result<Option<Match>, StoreError> {
        Ok(self.matches.get(name).map(|m| m.value().clone()))
    }

    async fn find_open_match(
        &self,
        predicate: &MatchFilter,
    ) -> Result<Option<Match>, StoreError> {
        let found = self
            .matches
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.name.cmp(&b.name))
            });
        Ok(found)
    }

    async fn create_match(&self, name: &str, players: Vec<String>) -> Result<Match, StoreError> {
        match self.matches.entry(name.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                let record = Match::new(name, players);
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn save_match(&self, record: &Match) -> Result<Match, StoreError> {
        let mut stored = self
            .matches
            .get_mut(&record.name)
            .ok_or_else(|| StoreError::NotFound(record.name.clone()))?;

        if stored.version != record.version {
            return Err(StoreError::Conflict {
                name: record.name.clone(),
                expected: record.version,
                found: stored.version,
            });
        }

        let mut updated = record.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_match(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.matches.remove(name).is_some())
    }

    async fn find_expired(&self, cutoff_millis: u64) -> Result<Vec<Match>, StoreError> {
        Ok(self
            .matches
            .iter()
            .filter(|entry| entry.value().is_expired(cutoff_millis))
            .map(|entry| entry.value().clone())
            .collect())
    }
}
