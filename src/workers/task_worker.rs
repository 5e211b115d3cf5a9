// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{Task, TaskStatus, TaskType};
use crate::queue::task_queue::{QueueError, TaskQueue};
use crate::utils::errors::WorkerError;
use crate::workers::handler::{BlockingHandler, HandlerError, HandlerRegistry, TaskHandler};
use crate::workers::worker::Worker;
use async_trait::async_trait;
use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// 单个任务的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// 处理成功
    Completed,
    /// 处理失败，已安排重试
    RetryScheduled,
    /// 处理失败，重试次数已耗尽
    Exhausted,
    /// 没有注册处理器，直接失败且不重试
    NoHandler,
}

/// 任务工作器
///
/// 轮询已注册的每个任务分类，领取任务并交给处理器执行，
/// 再把处理结果写回队列。
pub struct TaskWorker<Q: TaskQueue> {
    /// 任务队列
    queue: Arc<Q>,
    /// 处理器注册表
    registry: Arc<HandlerRegistry>,
    /// 运行标志
    running: AtomicBool,
    /// 停止时唤醒轮询间隔中的休眠
    wakeup: Notify,
    /// 两轮轮询之间的休眠时间
    poll_interval: Duration,
    name: String,
}

impl<Q: TaskQueue> TaskWorker<Q> {
    /// 创建新的任务工作器
    ///
    /// # 参数
    ///
    /// * `queue` - 任务队列
    pub fn new(queue: Arc<Q>) -> Self {
        Self::with_registry(queue, Arc::new(HandlerRegistry::new()))
    }

    /// 使用共享的处理器注册表创建工作器
    pub fn with_registry(queue: Arc<Q>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            queue,
            registry,
            running: AtomicBool::new(false),
            wakeup: Notify::new(),
            poll_interval: Duration::from_secs(1),
            name: "task-worker".to_string(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// 注册异步处理器
    pub fn register_handler<H: TaskHandler + 'static>(&self, task_type: TaskType, handler: H) {
        self.registry.register(task_type, handler);
        info!("Registered handler for task type {}", task_type);
    }

    /// 注册同步处理器，执行时放入阻塞线程池
    pub fn register_blocking_handler<F>(&self, task_type: TaskType, func: F)
    where
        F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.register_handler(task_type, BlockingHandler::new(func));
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 处理单个已领取的任务
    ///
    /// 处理器错误与panic都会被捕获并转换为失败状态，只有队列自身的错误会返回给调用者
    pub async fn process_task(&self, task: Task) -> Result<TaskOutcome, QueueError> {
        let task_id = task.id;
        let task_type = task.task_type;

        let handler = match self.registry.get(task_type) {
            Some(handler) => handler,
            None => {
                let message = format!("No handler registered for task type: {}", task_type);
                error!("Task {}: {}", task_id, message);
                self.queue
                    .update_task_status(task_id, TaskStatus::Failed, None, Some(message))
                    .await?;
                counter!(
                    "taskforge_tasks_failed_total",
                    "task_type" => task_type.as_str(),
                    "reason" => "no_handler"
                )
                .increment(1);
                return Ok(TaskOutcome::NoHandler);
            }
        };

        debug!(
            "Processing task {} (type={}, attempt={})",
            task_id,
            task_type,
            task.retry_count + 1
        );
        let start = Instant::now();
        let result = match AssertUnwindSafe(handler.handle(task.data))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
        };
        histogram!("taskforge_task_duration_seconds", "task_type" => task_type.as_str())
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(value) => {
                self.queue
                    .update_task_status(task_id, TaskStatus::Completed, Some(value), None)
                    .await?;
                counter!("taskforge_tasks_completed_total", "task_type" => task_type.as_str())
                    .increment(1);
                info!("Task {} completed", task_id);
                Ok(TaskOutcome::Completed)
            }
            Err(err) => {
                let message = err.to_string();
                self.queue
                    .update_task_status(task_id, TaskStatus::Failed, None, Some(message.clone()))
                    .await?;
                counter!(
                    "taskforge_tasks_failed_total",
                    "task_type" => task_type.as_str(),
                    "reason" => "handler_error"
                )
                .increment(1);

                if self.queue.retry_task(task_id).await? {
                    warn!("Task {} failed, retry scheduled: {}", task_id, message);
                    Ok(TaskOutcome::RetryScheduled)
                } else {
                    error!(
                        "Task {} failed permanently, retries exhausted: {}",
                        task_id, message
                    );
                    Ok(TaskOutcome::Exhausted)
                }
            }
        }
    }

    /// 执行一轮轮询
    ///
    /// 按固定顺序访问每个已注册分类，每个分类最多领取一个任务。
    /// 队列错误会中止本轮并返回。
    ///
    /// # 返回值
    ///
    /// * `Ok(usize)` - 本轮处理的任务数
    /// * `Err(WorkerError)` - 存储不可用等队列错误
    pub async fn run_once(&self) -> Result<usize, WorkerError> {
        let mut processed = 0;
        for task_type in self.registry.task_types() {
            if let Some(task) = self.queue.get_next_task(task_type).await? {
                self.process_task(task).await?;
                processed += 1;
            }
        }
        Ok(processed)
    }

    /// 运行轮询循环，直到 `stop` 被调用
    pub async fn run(&self, poll_interval: Duration) {
        self.running.store(true, Ordering::SeqCst);
        info!(
            "{} started (categories={:?}, poll_interval={:?})",
            self.name,
            self.registry.task_types(),
            poll_interval
        );

        while self.is_running() {
            if let Err(e) = self.run_once().await {
                error!("{} sweep aborted: {}", self.name, e);
            }

            // 先注册唤醒再检查标志，避免错过检查之后到达的 stop
            let stopped = self.wakeup.notified();
            if !self.is_running() {
                break;
            }

            tokio::select! {
                _ = sleep(poll_interval) => {}
                _ = stopped => {}
            }
        }

        info!("{} stopped", self.name);
    }

    /// 停止轮询循环
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wakeup.notify_waiters();
    }
}

#[async_trait]
impl<Q: TaskQueue + 'static> Worker for TaskWorker<Q> {
    async fn run(&self) -> Result<(), WorkerError> {
        TaskWorker::run(self, self.poll_interval).await;
        Ok(())
    }

    fn stop(&self) {
        TaskWorker::stop(self);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "task_worker_test.rs"]
mod tests;
