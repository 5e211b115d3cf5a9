// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// 键模式无效
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    /// 存储不可用
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// 任务存储特质
///
/// 队列依赖的外部存储契约：带过期时间的键值存储，以及按分数排序的命名集合。
/// 所有集合操作都以成员字符串为单位。
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 写入键值并设置过期时间
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// 读取键值，不存在或已过期时返回None
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 删除键
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// 刷新键的过期时间
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// 向有序集合添加成员，已存在时更新分数
    async fn add(&self, set_name: &str, member: &str, score: f64) -> Result<(), StoreError>;

    /// 从有序集合移除成员
    ///
    /// 返回本次调用是否真正移除了成员。并发调用中只有一个调用者会得到 `true`，
    /// 队列以此作为原子领取原语。
    async fn remove(&self, set_name: &str, member: &str) -> Result<bool, StoreError>;

    /// 按分数从高到低返回 `[start, stop]` 区间内的成员（闭区间，与 ZREVRANGE 一致）
    async fn reverse_range(
        &self,
        set_name: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError>;

    /// 有序集合的成员数量
    async fn cardinality(&self, set_name: &str) -> Result<u64, StoreError>;

    /// 按glob模式列出键（仅支持 `*` 通配符）
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<T: TaskStore + ?Sized> TaskStore for Arc<T> {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).expire(key, ttl).await
    }

    async fn add(&self, set_name: &str, member: &str, score: f64) -> Result<(), StoreError> {
        (**self).add(set_name, member, score).await
    }

    async fn remove(&self, set_name: &str, member: &str) -> Result<bool, StoreError> {
        (**self).remove(set_name, member).await
    }

    async fn reverse_range(
        &self,
        set_name: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        (**self).reverse_range(set_name, start, stop).await
    }

    async fn cardinality(&self, set_name: &str) -> Result<u64, StoreError> {
        (**self).cardinality(set_name).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        (**self).keys(pattern).await
    }
}
