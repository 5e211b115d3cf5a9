// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::WorkerError;
use async_trait::async_trait;

/// Worker trait定义
///
/// 所有后台工作器都必须实现此trait
#[async_trait]
pub trait Worker: Send + Sync {
    /// 运行工作器，直到 `stop` 被调用
    async fn run(&self) -> Result<(), WorkerError>;

    /// 协作式停止，正在执行的任务不会被中断
    fn stop(&self);

    /// 获取工作器名称
    fn name(&self) -> &str;
}
