// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{Task, TaskResult, TaskStatus, TaskType};
use crate::domain::repositories::task_store::{StoreError, TaskStore};
use crate::utils::retry_policy::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 优先级在复合分数中的权重
///
/// 一个优先级单位相当于约317年的毫秒数，时间分量永远无法越过优先级
pub const PRIORITY_WEIGHT: f64 = 1e13;

/// 允许的优先级范围，保证复合分数在f64中精确表示
pub const MIN_PRIORITY: i32 = -500;
pub const MAX_PRIORITY: i32 = 500;

/// 领取队首任务时，因并发竞争失败而重读队首的最大次数
const MAX_CLAIM_ATTEMPTS: usize = 5;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 存储错误
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 优先级超出范围
    #[error("Priority {0} out of range [-500, 500]")]
    InvalidPriority(i32),

    /// 延迟超出任务保留时间或时间范围
    #[error("Delay of {0}s exceeds the task retention period")]
    InvalidDelay(u64),

    /// 重试时间超出可表示的时间范围
    #[error("Retry backoff for task {0} is out of range")]
    InvalidBackoff(Uuid),
}

/// 入队选项
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// 优先级，数值越大越先执行
    pub priority: i32,
    /// 最大重试次数，None时使用队列默认值
    pub max_retries: Option<u32>,
    /// 延迟执行的秒数，0表示立即可执行
    pub delay_seconds: u64,
}

impl EnqueueOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_delay_seconds(mut self, delay_seconds: u64) -> Self {
        self.delay_seconds = delay_seconds;
        self
    }
}

/// 单个分类的队列统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QueueStats {
    /// 有序集合中等待领取的任务数
    pub pending: u64,
}

/// 队列配置
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// 存储键前缀
    pub key_prefix: String,
    /// 任务记录与有序集合的过期时间
    pub task_ttl: Duration,
    /// 结果保留时间相对任务过期时间的倍数
    pub result_ttl_multiplier: u32,
    /// 默认最大重试次数
    pub default_max_retries: u32,
    /// 重试退避策略
    pub retry_policy: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            key_prefix: "taskforge".to_string(),
            task_ttl: Duration::from_secs(24 * 60 * 60),
            result_ttl_multiplier: 7,
            default_max_retries: 3,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl QueueConfig {
    /// 结果记录的过期时间
    ///
    /// 溢出时视为永不过期
    pub fn result_ttl(&self) -> Duration {
        self.task_ttl
            .checked_mul(self.result_ttl_multiplier)
            .unwrap_or(Duration::MAX)
    }
}

/// 计算有序集合分数
///
/// 分数越高越先被取出：先比较优先级，同优先级时参考时间越早分数越高
pub fn priority_score(priority: i32, reference: DateTime<Utc>) -> f64 {
    priority as f64 * PRIORITY_WEIGHT - reference.timestamp_millis() as f64
}

/// 任务在有序集合中的参考时间
///
/// 入队时使用创建时间，等待重试时使用重试可执行时间
fn queue_reference(task: &Task) -> DateTime<Utc> {
    match (task.status, task.delay_until) {
        (TaskStatus::Retrying, Some(eligible_at)) => eligible_at,
        _ => task.created_at,
    }
}

/// 任务队列特质
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 入队任务，返回任务ID
    async fn enqueue(
        &self,
        task_type: TaskType,
        data: Value,
        options: EnqueueOptions,
    ) -> Result<Uuid, QueueError>;

    /// 根据ID获取任务
    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, QueueError>;

    /// 更新任务状态，任务不存在时返回false
    async fn update_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<bool, QueueError>;

    /// 领取指定分类中分数最高的任务
    async fn get_next_task(&self, task_type: TaskType) -> Result<Option<Task>, QueueError>;

    /// 按指数退避重新入队，重试次数耗尽时返回false
    async fn retry_task(&self, task_id: Uuid) -> Result<bool, QueueError>;

    /// 获取任务结果
    async fn get_task_result(&self, task_id: Uuid) -> Result<Option<TaskResult>, QueueError>;

    /// 获取各分类的待处理数量
    async fn get_queue_stats(
        &self,
        task_type: Option<TaskType>,
    ) -> Result<BTreeMap<TaskType, QueueStats>, QueueError>;
}

/// 基于 `TaskStore` 的任务队列实现
pub struct StoreTaskQueue<S: TaskStore> {
    /// 任务存储
    store: Arc<S>,
    /// 队列配置
    config: QueueConfig,
}

impl<S: TaskStore> StoreTaskQueue<S> {
    /// 创建新的任务队列实例
    ///
    /// # 参数
    ///
    /// * `store` - 任务存储
    /// * `config` - 队列配置
    pub fn new(store: Arc<S>, config: QueueConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn task_key(&self, task_id: &str) -> String {
        format!("{}:task:{}", self.config.key_prefix, task_id)
    }

    fn result_key(&self, task_id: &str) -> String {
        format!("{}:result:{}", self.config.key_prefix, task_id)
    }

    fn queue_key(&self, task_type: TaskType) -> String {
        format!("{}:queue:{}", self.config.key_prefix, task_type)
    }

    fn queue_key_prefix(&self) -> String {
        format!("{}:queue:", self.config.key_prefix)
    }

    async fn load_task(&self, task_id: &str) -> Result<Option<Task>, QueueError> {
        match self.store.get(&self.task_key(task_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// 保存任务记录，每次写入都会刷新过期时间
    async fn save_task(&self, task: &Task) -> Result<(), QueueError> {
        let raw = serde_json::to_string(task)?;
        self.store
            .set(&self.task_key(&task.id.to_string()), &raw, self.config.task_ttl)
            .await?;
        Ok(())
    }

    /// 将任务放入所属分类的有序集合，并刷新集合的过期时间
    async fn push_to_queue(&self, task: &Task, reference: DateTime<Utc>) -> Result<(), QueueError> {
        let queue_key = self.queue_key(task.task_type);
        self.store
            .add(
                &queue_key,
                &task.id.to_string(),
                priority_score(task.priority, reference),
            )
            .await?;
        self.store.expire(&queue_key, self.config.task_ttl).await?;
        Ok(())
    }
}

#[async_trait]
impl<S: TaskStore> TaskQueue for StoreTaskQueue<S> {
    /// 入队任务
    ///
    /// # 参数
    ///
    /// * `task_type` - 任务类型
    /// * `data` - 任务负载
    /// * `options` - 优先级、最大重试次数与延迟
    ///
    /// # 返回值
    ///
    /// * `Ok(Uuid)` - 新任务ID
    /// * `Err(QueueError)` - 优先级无效或存储失败
    async fn enqueue(
        &self,
        task_type: TaskType,
        data: Value,
        options: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&options.priority) {
            return Err(QueueError::InvalidPriority(options.priority));
        }

        let mut task = Task::new(task_type, data);
        task.priority = options.priority;
        task.max_retries = options
            .max_retries
            .unwrap_or(self.config.default_max_retries);
        if options.delay_seconds > 0 {
            // 延迟超过记录的保留时间时，任务在可执行前就会过期
            if options.delay_seconds > self.config.task_ttl.as_secs() {
                return Err(QueueError::InvalidDelay(options.delay_seconds));
            }
            let eligible_at = i64::try_from(options.delay_seconds)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .and_then(|delay| task.created_at.checked_add_signed(delay))
                .ok_or(QueueError::InvalidDelay(options.delay_seconds))?;
            task.delay_until = Some(eligible_at);
        }

        self.save_task(&task).await?;
        self.push_to_queue(&task, task.created_at).await?;

        counter!("taskforge_tasks_enqueued_total", "task_type" => task_type.as_str())
            .increment(1);
        info!(
            "Task {} enqueued (type={}, priority={}, delay={}s)",
            task.id, task_type, task.priority, options.delay_seconds
        );

        Ok(task.id)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, QueueError> {
        self.load_task(&task_id.to_string()).await
    }

    async fn update_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<bool, QueueError> {
        let mut task = match self.get_task(task_id).await? {
            Some(task) => task,
            None => {
                debug!("Status update for unknown task {}", task_id);
                return Ok(false);
            }
        };

        let now = Utc::now();
        task.status = status;
        task.updated_at = now;

        match status {
            TaskStatus::Completed => {
                let result = result.unwrap_or(Value::Null);
                let task_result = TaskResult {
                    task_id,
                    task_type: task.task_type,
                    result: result.clone(),
                    completed_at: now,
                };
                self.store
                    .set(
                        &self.result_key(&task_id.to_string()),
                        &serde_json::to_string(&task_result)?,
                        self.config.result_ttl(),
                    )
                    .await?;
                task.result = Some(result);
                task.error = None;
            }
            TaskStatus::Failed => {
                if error.is_some() {
                    task.error = error;
                }
            }
            TaskStatus::Retrying => {
                if task.can_retry() {
                    task.retry_count += 1;
                }
                if error.is_some() {
                    task.error = error;
                }
            }
            TaskStatus::Pending | TaskStatus::Processing => {}
        }

        self.save_task(&task).await?;
        debug!("Task {} status updated to {}", task_id, status);
        Ok(true)
    }

    /// 领取任务
    ///
    /// 只查看队首：队首记录已过期则清理并返回None；队首仍在延迟期内则返回None，
    /// 同分类后面的任务也会因此被阻塞，直到队首可执行。
    /// 领取通过 `remove` 的返回值判定，竞争失败的调用者会重新读取队首。
    async fn get_next_task(&self, task_type: TaskType) -> Result<Option<Task>, QueueError> {
        let queue_key = self.queue_key(task_type);

        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let task_id = match self.store.reverse_range(&queue_key, 0, 0).await?.pop() {
                Some(task_id) => task_id,
                None => return Ok(None),
            };

            let peeked = match self.load_task(&task_id).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    self.store.remove(&queue_key, &task_id).await?;
                    debug!("Removed dangling queue entry {} from {}", task_id, queue_key);
                    return Ok(None);
                }
                Err(QueueError::Serialization(e)) => {
                    self.store.remove(&queue_key, &task_id).await?;
                    warn!("Dropped unreadable task {} from {}: {}", task_id, queue_key, e);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            if !peeked.is_eligible_at(Utc::now()) {
                return Ok(None);
            }

            if !self.store.remove(&queue_key, &task_id).await? {
                debug!("Task {} claimed by another worker, re-reading head", task_id);
                continue;
            }

            // 读取与移除之间，其他工作器可能已领取、处理失败并重新入队同一任务，
            // 因此以移除成功后重新读取的记录为准
            let mut task = match self.load_task(&task_id).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    debug!("Task {} expired while being claimed", task_id);
                    return Ok(None);
                }
                Err(QueueError::Serialization(e)) => {
                    warn!("Dropped unreadable task {} from {}: {}", task_id, queue_key, e);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            if !matches!(task.status, TaskStatus::Pending | TaskStatus::Retrying) {
                debug!(
                    "Discarded stale queue entry for task {} in state {}",
                    task_id, task.status
                );
                continue;
            }

            let now = Utc::now();
            if !task.is_eligible_at(now) {
                // 记录已被重新安排，按其当前分数放回
                self.push_to_queue(&task, queue_reference(&task)).await?;
                debug!("Task {} was rescheduled while being claimed, put back", task_id);
                return Ok(None);
            }

            task.status = TaskStatus::Processing;
            task.updated_at = now;
            self.save_task(&task).await?;
            return Ok(Some(task));
        }

        Ok(None)
    }

    async fn retry_task(&self, task_id: Uuid) -> Result<bool, QueueError> {
        let mut task = match self.get_task(task_id).await? {
            Some(task) => task,
            None => return Ok(false),
        };

        if !task.can_retry() {
            debug!(
                "Task {} exhausted retries ({}/{})",
                task_id, task.retry_count, task.max_retries
            );
            return Ok(false);
        }

        let now = Utc::now();
        let eligible_at = self
            .config
            .retry_policy
            .next_retry_time(task.retry_count, now)
            .ok_or(QueueError::InvalidBackoff(task_id))?;

        task.status = TaskStatus::Retrying;
        task.retry_count += 1;
        task.delay_until = Some(eligible_at);
        task.updated_at = now;

        self.save_task(&task).await?;
        self.push_to_queue(&task, eligible_at).await?;

        counter!("taskforge_tasks_retried_total", "task_type" => task.task_type.as_str())
            .increment(1);
        info!(
            "Task {} scheduled for retry {}/{} at {}",
            task_id, task.retry_count, task.max_retries, eligible_at
        );
        Ok(true)
    }

    async fn get_task_result(&self, task_id: Uuid) -> Result<Option<TaskResult>, QueueError> {
        match self.store.get(&self.result_key(&task_id.to_string())).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn get_queue_stats(
        &self,
        task_type: Option<TaskType>,
    ) -> Result<BTreeMap<TaskType, QueueStats>, QueueError> {
        let task_types: Vec<TaskType> = match task_type {
            Some(task_type) => vec![task_type],
            None => {
                let prefix = self.queue_key_prefix();
                self.store
                    .keys(&format!("{}*", prefix))
                    .await?
                    .iter()
                    .filter_map(|key| key.strip_prefix(&prefix))
                    .filter_map(|name| name.parse::<TaskType>().ok())
                    .collect()
            }
        };

        let mut stats = BTreeMap::new();
        for task_type in task_types {
            let pending = self.store.cardinality(&self.queue_key(task_type)).await?;
            stats.insert(task_type, QueueStats { pending });
        }
        Ok(stats)
    }
}

#[async_trait]
impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    async fn enqueue(
        &self,
        task_type: TaskType,
        data: Value,
        options: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        (**self).enqueue(task_type, data, options).await
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>, QueueError> {
        (**self).get_task(task_id).await
    }

    async fn update_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<bool, QueueError> {
        (**self)
            .update_task_status(task_id, status, result, error)
            .await
    }

    async fn get_next_task(&self, task_type: TaskType) -> Result<Option<Task>, QueueError> {
        (**self).get_next_task(task_type).await
    }

    async fn retry_task(&self, task_id: Uuid) -> Result<bool, QueueError> {
        (**self).retry_task(task_id).await
    }

    async fn get_task_result(&self, task_id: Uuid) -> Result<Option<TaskResult>, QueueError> {
        (**self).get_task_result(task_id).await
    }

    async fn get_queue_stats(
        &self,
        task_type: Option<TaskType>,
    ) -> Result<BTreeMap<TaskType, QueueStats>, QueueError> {
        (**self).get_queue_stats(task_type).await
    }
}

#[cfg(test)]
#[path = "task_queue_test.rs"]
mod tests;
