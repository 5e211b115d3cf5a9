// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 初始化指标系统
///
/// 启动Prometheus导出器并登记队列相关指标。地址无效或端口被占用时只记录警告。
pub fn init_metrics(listen_addr: &str) {
    let addr: SocketAddr = match listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", listen_addr, e);
            return;
        }
    };

    // Ignore error if address is already in use (for development/testing)
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return;
    }

    describe_counter!(
        "taskforge_tasks_enqueued_total",
        "Total number of tasks enqueued"
    );
    describe_counter!(
        "taskforge_tasks_completed_total",
        "Total number of tasks completed"
    );
    describe_counter!(
        "taskforge_tasks_failed_total",
        "Total number of failed task attempts"
    );
    describe_counter!(
        "taskforge_tasks_retried_total",
        "Total number of retries scheduled"
    );
    describe_histogram!(
        "taskforge_task_duration_seconds",
        "Duration of task handler execution in seconds"
    );

    info!("Metrics exporter listening on {}", addr);
}
