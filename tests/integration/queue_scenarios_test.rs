// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 队列场景集成测试
//!
//! 通过公开接口验证生产者与工作器之间的完整交互：
//! - 高优先级邮件先发送
//! - 持续失败的任务按指数退避重试直至耗尽
//! - 延迟任务与结果保留

use super::helpers::{claim_eventually, create_test_queue};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use taskforge::domain::models::task::{TaskStatus, TaskType};
use taskforge::infrastructure::repositories::memory_task_store::InMemoryTaskStore;
use taskforge::queue::task_queue::{EnqueueOptions, QueueConfig, StoreTaskQueue, TaskQueue};
use taskforge::workers::handler::{HandlerError, TaskHandler};
use taskforge::workers::task_worker::{TaskOutcome, TaskWorker};

struct RecordingHandler {
    seen: parking_lot::Mutex<Vec<String>>,
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, data: Value) -> Result<Value, HandlerError> {
        let to = data["to"].as_str().unwrap_or_default().to_string();
        self.seen.lock().push(to.clone());
        Ok(json!({ "sent": to }))
    }
}

struct AlwaysFailing;

#[async_trait]
impl TaskHandler for AlwaysFailing {
    async fn handle(&self, _data: Value) -> Result<Value, HandlerError> {
        Err(HandlerError::Failed("upstream unavailable".to_string()))
    }
}

/// 场景：先入队低优先级邮件，再入队高优先级邮件，高优先级的先发送
#[tokio::test]
async fn test_high_priority_email_sent_first() {
    let queue = create_test_queue(Duration::from_millis(50));
    let handler = Arc::new(RecordingHandler {
        seen: parking_lot::Mutex::new(Vec::new()),
    });
    let worker = TaskWorker::new(queue.clone());
    worker
        .registry()
        .register_arc(TaskType::SendEmail, handler.clone());

    let low = queue
        .enqueue(
            TaskType::SendEmail,
            json!({"to": "b@x.com"}),
            EnqueueOptions::default().with_priority(1),
        )
        .await
        .unwrap();
    let high = queue
        .enqueue(
            TaskType::SendEmail,
            json!({"to": "a@x.com"}),
            EnqueueOptions::default().with_priority(5),
        )
        .await
        .unwrap();

    assert_eq!(worker.run_once().await.unwrap(), 1);
    assert_eq!(worker.run_once().await.unwrap(), 1);

    assert_eq!(*handler.seen.lock(), vec!["a@x.com", "b@x.com"]);
    for id in [high, low] {
        let task = queue.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }
}

/// 场景：处理器始终失败，最大重试3次，共执行4次，退避时间依次翻倍
#[tokio::test]
async fn test_always_failing_task_backs_off_then_fails() {
    let queue = create_test_queue(Duration::from_millis(40));
    let worker = TaskWorker::new(queue.clone());
    worker.register_handler(TaskType::ImportJob, AlwaysFailing);

    let id = queue
        .enqueue(
            TaskType::ImportJob,
            json!({"file": "users.csv"}),
            EnqueueOptions::default().with_max_retries(3),
        )
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    let mut backoffs = Vec::new();
    for _ in 0..4 {
        let task = claim_eventually(&queue, TaskType::ImportJob).await;
        assert_eq!(task.status, TaskStatus::Processing);
        outcomes.push(worker.process_task(task).await.unwrap());

        let task = queue.get_task(id).await.unwrap().unwrap();
        if task.status == TaskStatus::Retrying {
            let until = task.delay_until.unwrap();
            backoffs.push((until - task.updated_at).num_milliseconds());
        }
    }

    assert_eq!(outcomes.last(), Some(&TaskOutcome::Exhausted));
    assert_eq!(backoffs, vec![40, 80, 160]);

    let task = queue.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retry_count, 3);
    assert_eq!(task.error.as_deref(), Some("upstream unavailable"));
    assert!(!queue.retry_task(id).await.unwrap());
    assert_eq!(queue.get_task(id).await.unwrap().unwrap().status, TaskStatus::Failed);
}

/// 场景：延迟任务在延迟结束前不可领取，且阻塞同分类的后续任务
#[tokio::test]
async fn test_delayed_task_becomes_eligible_after_delay() {
    let queue = create_test_queue(Duration::from_millis(50));

    let delayed = queue
        .enqueue(
            TaskType::GithubSync,
            json!({"repo": "octo/app"}),
            EnqueueOptions::default().with_priority(10).with_delay_seconds(1),
        )
        .await
        .unwrap();
    let immediate = queue
        .enqueue(TaskType::GithubSync, json!({"repo": "octo/lib"}), EnqueueOptions::default())
        .await
        .unwrap();

    assert!(queue.get_next_task(TaskType::GithubSync).await.unwrap().is_none());

    let first = claim_eventually(&queue, TaskType::GithubSync).await;
    assert_eq!(first.id, delayed);
    let second = claim_eventually(&queue, TaskType::GithubSync).await;
    assert_eq!(second.id, immediate);
}

/// 场景：任务记录过期后结果仍然可读
#[tokio::test]
async fn test_result_retained_after_task_expiry() {
    let config = QueueConfig {
        task_ttl: Duration::from_secs(1),
        ..QueueConfig::default()
    };
    let queue = Arc::new(StoreTaskQueue::new(Arc::new(InMemoryTaskStore::new()), config));
    let worker = TaskWorker::new(queue.clone());
    worker.register_blocking_handler(TaskType::ImportJob, |data| {
        Ok(json!({"imported": data["rows"].clone()}))
    });

    let id = queue
        .enqueue(TaskType::ImportJob, json!({"rows": 42}), EnqueueOptions::default())
        .await
        .unwrap();
    assert_eq!(worker.run_once().await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(1_200)).await;

    assert!(queue.get_task(id).await.unwrap().is_none());
    let result = queue.get_task_result(id).await.unwrap().unwrap();
    assert_eq!(result.task_type, TaskType::ImportJob);
    assert_eq!(result.result, json!({"imported": 42}));
}
