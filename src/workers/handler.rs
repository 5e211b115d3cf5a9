// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::task::{DomainError, TaskType};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// 处理器错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// 处理失败，可重试
    #[error("{0}")]
    Failed(String),

    /// 处理器发生panic
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::Failed(format!("{:#}", err))
    }
}

/// 任务处理器特质
///
/// 接收任务负载，返回结果或错误。负载与结果的结构由生产者和处理器自行约定。
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, data: Value) -> Result<Value, HandlerError>;
}

/// 同步处理器适配器
///
/// 将同步闭包放到阻塞线程池执行，避免阻塞轮询循环
pub struct BlockingHandler<F> {
    func: Arc<F>,
}

impl<F> BlockingHandler<F>
where
    F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    pub fn new(func: F) -> Self {
        Self {
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl<F> TaskHandler for BlockingHandler<F>
where
    F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    async fn handle(&self, data: Value) -> Result<Value, HandlerError> {
        let func = self.func.clone();
        match tokio::task::spawn_blocking(move || func(data)).await {
            Ok(result) => result,
            Err(join_error) => Err(HandlerError::Panicked(join_error.to_string())),
        }
    }
}

/// 处理器注册表
///
/// 以任务类型为键，遍历顺序固定为 `TaskType` 的声明顺序
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<BTreeMap<TaskType, Arc<dyn TaskHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，重复注册会覆盖旧的处理器
    pub fn register<H: TaskHandler + 'static>(&self, task_type: TaskType, handler: H) {
        self.register_arc(task_type, Arc::new(handler));
    }

    /// 注册共享的处理器实例
    pub fn register_arc(&self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        let mut handlers = self.handlers.write();
        if handlers.insert(task_type, handler).is_some() {
            warn!("Handler for task type {} replaced", task_type);
        }
    }

    /// 按名称注册处理器，名称必须是已知的任务类型
    pub fn register_by_name<H: TaskHandler + 'static>(
        &self,
        name: &str,
        handler: H,
    ) -> Result<TaskType, DomainError> {
        let task_type: TaskType = name.parse()?;
        self.register(task_type, handler);
        Ok(task_type)
    }

    /// 获取任务类型对应的处理器
    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().get(&task_type).cloned()
    }

    /// 已注册的任务类型
    pub fn task_types(&self) -> Vec<TaskType> {
        self.handlers.read().keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
