// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::task_store::{StoreError, TaskStore};
use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// 带过期时间的存储条目
struct StoreEntry<T> {
    data: T,
    expires_at: Option<Instant>,
}

impl<T> StoreEntry<T> {
    fn new(data: T, ttl: Option<Duration>) -> Self {
        Self {
            data,
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| Instant::now() >= at)
            .unwrap_or(false)
    }
}

/// 内存任务存储
///
/// 用于测试和本地开发。过期条目在访问时惰性清理。
/// 每个键的读写都在DashMap的分片锁内完成，`remove` 因此具有原子性。
#[derive(Default)]
pub struct InMemoryTaskStore {
    values: DashMap<String, StoreEntry<String>>,
    sets: DashMap<String, StoreEntry<HashMap<String, f64>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired_set(&self, set_name: &str) {
        self.sets.remove_if(set_name, |_, entry| entry.is_expired());
    }

    fn glob_to_regex(pattern: &str) -> Result<Regex, StoreError> {
        let escaped = regex::escape(pattern).replace(r"\*", ".*");
        Regex::new(&format!("^{}$", escaped))
            .map_err(|e| StoreError::InvalidPattern(e.to_string()))
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.values
            .insert(key.to_string(), StoreEntry::new(value.to_string(), Some(ttl)));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(entry) = self.values.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.data.clone()));
            }
        } else {
            return Ok(None);
        }

        self.values.remove_if(key, |_, entry| entry.is_expired());
        debug!("Evicted expired key: {}", key);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        self.sets.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        // 超出时钟范围的过期时间视为永不过期
        let expires_at = Instant::now().checked_add(ttl);
        if let Some(mut entry) = self.values.get_mut(key) {
            entry.expires_at = expires_at;
        }
        if let Some(mut entry) = self.sets.get_mut(key) {
            entry.expires_at = expires_at;
        }
        Ok(())
    }

    async fn add(&self, set_name: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.purge_expired_set(set_name);
        self.sets
            .entry(set_name.to_string())
            .or_insert_with(|| StoreEntry::new(HashMap::new(), None))
            .data
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn remove(&self, set_name: &str, member: &str) -> Result<bool, StoreError> {
        self.purge_expired_set(set_name);
        let removed = match self.sets.get_mut(set_name) {
            Some(mut entry) => entry.data.remove(member).is_some(),
            None => false,
        };
        // 与Redis一致：空集合不再存在
        self.sets.remove_if(set_name, |_, entry| entry.data.is_empty());
        Ok(removed)
    }

    async fn reverse_range(
        &self,
        set_name: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        self.purge_expired_set(set_name);
        let mut members: Vec<(String, f64)> = match self.sets.get(set_name) {
            Some(entry) => entry
                .data
                .iter()
                .map(|(member, score)| (member.clone(), *score))
                .collect(),
            None => return Ok(Vec::new()),
        };

        // ZREVRANGE: 分数降序，同分时按成员字典序降序
        members.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });

        let len = members.len() as isize;
        let normalize = |index: isize| if index < 0 { len + index } else { index };
        let start = normalize(start).max(0);
        let stop = normalize(stop).min(len - 1);
        if start > stop || start >= len {
            return Ok(Vec::new());
        }

        Ok(members
            .into_iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|(member, _)| member)
            .collect())
    }

    async fn cardinality(&self, set_name: &str) -> Result<u64, StoreError> {
        self.purge_expired_set(set_name);
        Ok(self
            .sets
            .get(set_name)
            .map(|entry| entry.data.len() as u64)
            .unwrap_or(0))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let matcher = Self::glob_to_regex(pattern)?;
        let mut keys: Vec<String> = self
            .values
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .chain(
                self.sets
                    .iter()
                    .filter(|entry| !entry.value().is_expired())
                    .map(|entry| entry.key().clone()),
            )
            .filter(|key| matcher.is_match(key))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
