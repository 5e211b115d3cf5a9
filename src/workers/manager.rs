// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::workers::worker::Worker;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 工作管理器
///
/// 为同一个工作器启动多个轮询循环，并负责协作式关闭
pub struct WorkerManager<W: Worker + 'static> {
    worker: Arc<W>,
    handles: Vec<JoinHandle<()>>,
}

impl<W: Worker + 'static> WorkerManager<W> {
    pub fn new(worker: Arc<W>) -> Self {
        Self {
            worker,
            handles: Vec::new(),
        }
    }

    /// 已启动的轮询循环数量
    pub fn active_loops(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// 启动工作进程
    ///
    /// # 参数
    ///
    /// * `count` - 要启动的轮询循环数量
    pub fn start_workers(&mut self, count: usize) {
        for index in 0..count {
            let worker = self.worker.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = worker.run().await {
                    error!("{} loop {} exited with error: {}", worker.name(), index, e);
                }
            });
            self.handles.push(handle);
        }
        info!("Started {} loop(s) of {}", count, self.worker.name());
    }

    /// 停止所有轮询循环并等待其退出
    ///
    /// 正在执行的任务会先完成
    pub async fn shutdown(&mut self) {
        info!("Shutting down workers...");
        self.worker.stop();

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Worker loop terminated abnormally: {}", e);
            }
        }

        info!("Workers shut down successfully");
    }

    /// 等待关闭信号并关闭工作进程
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        self.shutdown().await;
    }
}
