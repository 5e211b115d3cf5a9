// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 存储故障传播测试
//!
//! 使用mockall模拟存储，验证存储错误会原样返回给调用者，
//! 以及并发领取失败时队列的处理方式。

use async_trait::async_trait;
use mockall::mock;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use taskforge::domain::models::task::{Task, TaskType};
use taskforge::domain::repositories::task_store::{StoreError, TaskStore};
use taskforge::queue::task_queue::{EnqueueOptions, QueueConfig, QueueError, StoreTaskQueue, TaskQueue};
use taskforge::utils::errors::WorkerError;
use taskforge::workers::handler::HandlerError;
use taskforge::workers::task_worker::TaskWorker;

mock! {
    pub Store {}

    #[async_trait]
    impl TaskStore for Store {
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
        async fn delete(&self, key: &str) -> Result<(), StoreError>;
        async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
        async fn add(&self, set_name: &str, member: &str, score: f64) -> Result<(), StoreError>;
        async fn remove(&self, set_name: &str, member: &str) -> Result<bool, StoreError>;
        async fn reverse_range(
            &self,
            set_name: &str,
            start: isize,
            stop: isize,
        ) -> Result<Vec<String>, StoreError>;
        async fn cardinality(&self, set_name: &str) -> Result<u64, StoreError>;
        async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

fn queue_with(store: MockStore) -> Arc<StoreTaskQueue<MockStore>> {
    Arc::new(StoreTaskQueue::new(Arc::new(store), QueueConfig::default()))
}

#[tokio::test]
async fn test_enqueue_propagates_store_error() {
    let mut store = MockStore::new();
    store.expect_set().times(1).returning(|_, _, _| Err(unavailable()));
    store.expect_add().never();

    let queue = queue_with(store);
    let result = queue
        .enqueue(TaskType::SendEmail, json!({"to": "a@x.com"}), EnqueueOptions::default())
        .await;

    assert!(matches!(
        result,
        Err(QueueError::Store(StoreError::Unavailable(_)))
    ));
}

#[tokio::test]
async fn test_enqueue_writes_record_then_queue_entry() {
    let mut store = MockStore::new();
    store
        .expect_set()
        .withf(|key, _, ttl| key.starts_with("taskforge:task:") && *ttl == Duration::from_secs(86_400))
        .times(1)
        .returning(|_, _, _| Ok(()));
    store
        .expect_add()
        .withf(|set_name, _, _| set_name == "taskforge:queue:import_job")
        .times(1)
        .returning(|_, _, _| Ok(()));
    store
        .expect_expire()
        .withf(|key, _| key == "taskforge:queue:import_job")
        .times(1)
        .returning(|_, _| Ok(()));

    let queue = queue_with(store);
    queue
        .enqueue(TaskType::ImportJob, json!({"rows": 10}), EnqueueOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_invalid_priority_never_touches_store() {
    let mut store = MockStore::new();
    store.expect_set().never();
    store.expect_add().never();

    let queue = queue_with(store);
    let result = queue
        .enqueue(
            TaskType::SendEmail,
            json!({}),
            EnqueueOptions::default().with_priority(-501),
        )
        .await;

    assert!(matches!(result, Err(QueueError::InvalidPriority(-501))));
}

#[tokio::test]
async fn test_lost_claim_race_gives_up_after_bounded_attempts() {
    let task = Task::new(TaskType::GithubSync, json!({"repo": "octo/demo"}));
    let task_id = task.id.to_string();
    let record = serde_json::to_string(&task).unwrap();

    let mut store = MockStore::new();
    let head = task_id.clone();
    store
        .expect_reverse_range()
        .returning(move |_, _, _| Ok(vec![head.clone()]));
    store
        .expect_get()
        .returning(move |_| Ok(Some(record.clone())));
    // 每次都被其他工作器抢先移除
    store.expect_remove().times(5).returning(|_, _| Ok(false));
    store.expect_set().never();

    let queue = queue_with(store);
    let claimed = queue.get_next_task(TaskType::GithubSync).await.unwrap();
    assert!(claimed.is_none());
}

#[tokio::test]
async fn test_run_once_surfaces_store_failure() {
    let mut store = MockStore::new();
    store
        .expect_reverse_range()
        .returning(|_, _, _| Err(unavailable()));

    let queue = queue_with(store);
    let worker = TaskWorker::new(queue);
    worker.register_blocking_handler(TaskType::SendEmail, |data| {
        Ok::<_, HandlerError>(data)
    });

    let result = worker.run_once().await;
    assert!(matches!(
        result,
        Err(WorkerError::Queue(QueueError::Store(StoreError::Unavailable(_))))
    ));
}
