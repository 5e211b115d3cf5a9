// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 任务实体
///
/// 表示一个延迟执行的后台工作单元。任务按类型进入各自的有序集合，
/// 由工作器按优先级取出并交给对应的处理器执行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// 任务唯一标识符，创建后不可变
    pub id: Uuid,
    /// 任务类型，决定使用哪个有序集合和处理器
    pub task_type: TaskType,
    /// 任务负载数据，由生产者定义，队列不解析
    pub data: serde_json::Value,
    /// 任务状态
    pub status: TaskStatus,
    /// 任务优先级，数值越大越先执行
    pub priority: i32,
    /// 最大自动重试次数
    pub max_retries: u32,
    /// 已重试次数，永远不会超过 `max_retries`
    pub retry_count: u32,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 最后更新时间
    pub updated_at: DateTime<Utc>,
    /// 在此时间之前任务不可被取出
    pub delay_until: Option<DateTime<Utc>>,
    /// 成功完成时的结果
    pub result: Option<serde_json::Value>,
    /// 失败时的错误信息
    pub error: Option<String>,
}

/// 任务类型枚举
///
/// 封闭的任务类别集合，每个类别拥有独立的有序集合和处理器。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// 发送邮件
    #[default]
    SendEmail,
    /// 数据导入
    ImportJob,
    /// 仓库同步
    GithubSync,
}

impl TaskType {
    /// 所有任务类型，按固定的轮询顺序排列
    pub const ALL: [TaskType; 3] = [TaskType::SendEmail, TaskType::ImportJob, TaskType::GithubSync];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SendEmail => "send_email",
            TaskType::ImportJob => "import_job",
            TaskType::GithubSync => "github_sync",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send_email" => Ok(TaskType::SendEmail),
            "import_job" => Ok(TaskType::ImportJob),
            "github_sync" => Ok(TaskType::GithubSync),
            other => Err(DomainError::ValidationError(format!(
                "unknown task type: {}",
                other
            ))),
        }
    }
}

/// 任务状态枚举
///
/// 状态转换遵循以下流程：
/// Pending → Processing → Completed/Failed
/// Failed → Retrying → (重新入队) → Processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 等待执行
    #[default]
    Pending,
    /// 已被工作器领取，正在执行
    Processing,
    /// 执行成功
    Completed,
    /// 执行失败
    Failed,
    /// 已安排重试，等待退避时间结束
    Retrying,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Retrying => write!(f, "retrying"),
        }
    }
}

/// 任务结果
///
/// 独立于任务记录保存，保留时间更长，任务记录过期后仍可查询。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub result: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 验证错误，当输入数据不符合领域规则时发生
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl Task {
    /// 创建一个新的待执行任务
    ///
    /// # 参数
    ///
    /// * `task_type` - 任务类型
    /// * `data` - 任务负载数据
    ///
    /// # 返回值
    ///
    /// 返回状态为 Pending、重试次数为 0 的任务
    pub fn new(task_type: TaskType, data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_type,
            data,
            status: TaskStatus::Pending,
            priority: 0,
            max_retries: 3,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            delay_until: None,
            result: None,
            error: None,
        }
    }

    /// 判断任务是否还有剩余的重试次数
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// 判断任务在给定时间点是否可被取出
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        match self.delay_until {
            Some(until) => until <= now,
            None => true,
        }
    }
}
