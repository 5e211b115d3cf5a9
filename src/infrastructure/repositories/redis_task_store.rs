// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::task_store::{StoreError, TaskStore};
use crate::infrastructure::cache::redis_client::RedisClient;
use async_trait::async_trait;
use std::time::Duration;

/// 基于Redis的任务存储实现
///
/// 任务记录使用 `SET EX` 保存，分类队列使用有序集合保存。
/// `remove` 直接返回 `ZREM` 的计数，因此并发领取时只有一个调用者成功。
#[derive(Clone)]
pub struct RedisTaskStore {
    redis: RedisClient,
}

impl RedisTaskStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

/// 过期时间上限（约一百年），避免超出Redis可接受的范围
const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// Redis的过期时间以秒为单位，不足一秒的按一秒处理
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().clamp(1, MAX_TTL_SECONDS)
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.redis.set(key, value, ttl_seconds(ttl)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.redis.get(key).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.redis.del(key).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.redis.expire(key, ttl_seconds(ttl)).await?;
        Ok(())
    }

    async fn add(&self, set_name: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.redis.zadd(set_name, member, score).await?;
        Ok(())
    }

    async fn remove(&self, set_name: &str, member: &str) -> Result<bool, StoreError> {
        let removed = self.redis.zrem(set_name, member).await?;
        Ok(removed > 0)
    }

    async fn reverse_range(
        &self,
        set_name: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self.redis.zrevrange(set_name, start, stop).await?)
    }

    async fn cardinality(&self, set_name: &str) -> Result<u64, StoreError> {
        Ok(self.redis.zcard(set_name).await?)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.redis.keys(pattern).await?)
    }
}
