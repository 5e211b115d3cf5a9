// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 邮件任务示例：入队几封邮件，其中一封首次发送失败后重试成功。
//!
//! 运行：`cargo run --example email_worker`

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use taskforge::config::settings::LogFormat;
use taskforge::domain::models::task::{TaskStatus, TaskType};
use taskforge::infrastructure::repositories::memory_task_store::InMemoryTaskStore;
use taskforge::queue::task_queue::{EnqueueOptions, QueueConfig, StoreTaskQueue, TaskQueue};
use taskforge::utils::telemetry;
use taskforge::workers::handler::{HandlerError, TaskHandler};
use taskforge::workers::manager::WorkerManager;
use taskforge::workers::task_worker::TaskWorker;
use tracing::info;

/// 模拟邮件网关：每个收件人第一次投递都会超时
#[derive(Default)]
struct EmailHandler {
    attempted: parking_lot::Mutex<HashSet<String>>,
}

#[async_trait]
impl TaskHandler for EmailHandler {
    async fn handle(&self, data: Value) -> Result<Value, HandlerError> {
        let to = data["to"]
            .as_str()
            .ok_or_else(|| HandlerError::Failed("missing recipient".to_string()))?
            .to_string();

        let first_attempt = self.attempted.lock().insert(to.clone());
        if first_attempt && data["flaky"].as_bool().unwrap_or(false) {
            return Err(HandlerError::Failed(format!("SMTP timeout sending to {}", to)));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(json!({ "delivered_to": to, "subject": data["subject"].clone() }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_telemetry(LogFormat::Pretty);

    let mut config = QueueConfig::default();
    config.retry_policy.initial_backoff = Duration::from_millis(200);
    let queue = Arc::new(StoreTaskQueue::new(
        Arc::new(InMemoryTaskStore::new()),
        config,
    ));

    let mut ids = Vec::new();
    for (to, priority, flaky) in [
        ("ops@example.com", 10, false),
        ("alice@example.com", 0, true),
        ("bob@example.com", 0, false),
    ] {
        let id = queue
            .enqueue(
                TaskType::SendEmail,
                json!({ "to": to, "subject": "Weekly report", "flaky": flaky }),
                EnqueueOptions::default().with_priority(priority),
            )
            .await?;
        ids.push(id);
    }

    let worker = TaskWorker::new(queue.clone()).with_poll_interval(Duration::from_millis(50));
    worker.register_handler(TaskType::SendEmail, EmailHandler::default());

    let mut manager = WorkerManager::new(Arc::new(worker));
    manager.start_workers(2);

    loop {
        let mut done = 0;
        for id in &ids {
            if let Some(task) = queue.get_task(*id).await? {
                // 失败后到安排重试之前状态短暂为 failed
                let settled = task.status == TaskStatus::Completed
                    || (task.status == TaskStatus::Failed && !task.can_retry());
                if settled {
                    done += 1;
                }
            }
        }
        if done == ids.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    manager.shutdown().await;

    for id in ids {
        if let Some(task) = queue.get_task(id).await? {
            info!(
                "Task {} finished as {} after {} retries",
                id, task.status, task.retry_count
            );
            if task.status == TaskStatus::Completed {
                if let Some(result) = queue.get_task_result(id).await? {
                    info!("Result: {}", result.result);
                }
            }
        }
    }

    Ok(())
}
