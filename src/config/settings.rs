// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::queue::task_queue::QueueConfig;
use crate::utils::retry_policy::RetryPolicy;
use config::{Config, ConfigError, Environment, File, Map};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含Redis、存储、队列、重试、工作器、日志和指标等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Redis配置
    pub redis: RedisSettings,
    /// 存储配置
    pub store: StoreSettings,
    /// 队列配置
    pub queue: QueueSettings,
    /// 重试配置
    pub retry: RetrySettings,
    /// 工作器配置
    pub worker: WorkerSettings,
    /// 日志配置
    pub telemetry: TelemetrySettings,
    /// 指标配置
    pub metrics: MetricsSettings,
}

/// Redis配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis连接URL
    pub url: String,
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// 存储后端 (redis, memory)
    pub backend: StoreBackend,
    /// 所有键的前缀
    pub key_prefix: String,
}

/// 队列配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// 任务记录过期时间（秒）
    pub task_ttl_seconds: u64,
    /// 结果过期时间相对任务过期时间的倍数
    pub result_ttl_multiplier: u32,
    /// 未指定时的默认最大重试次数
    pub default_max_retries: u32,
}

/// 重试配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// 初始退避时间（毫秒）
    pub initial_backoff_ms: u64,
    /// 退避倍数
    pub backoff_multiplier: f64,
    /// 最大退避时间（秒）
    pub max_backoff_seconds: u64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

/// 工作器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 并发轮询循环数量
    pub concurrency: usize,
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    pub log_format: LogFormat,
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启用Prometheus导出
    pub enabled: bool,
    /// 导出监听地址
    pub listen_addr: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从配置文件和环境变量加载配置，支持默认值
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// 使用给定的环境变量集合加载配置，而不读取进程环境
    pub fn from_env_map(vars: Map<String, String>) -> Result<Self, ConfigError> {
        Self::load(Some(vars))
    }

    fn load(env_source: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Start with default settings
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("store.backend", "redis")?
            .set_default("store.key_prefix", "taskforge")?
            // Default queue settings
            .set_default("queue.task_ttl_seconds", 86_400)?
            .set_default("queue.result_ttl_multiplier", 7)?
            .set_default("queue.default_max_retries", 3)?
            // Default retry settings
            .set_default("retry.initial_backoff_ms", 1_000)?
            .set_default("retry.backoff_multiplier", 2.0)?
            .set_default("retry.max_backoff_seconds", 3_600)?
            .set_default("retry.enable_jitter", false)?
            // Default worker settings
            .set_default("worker.poll_interval_ms", 1_000)?
            .set_default("worker.concurrency", 1)?
            .set_default("telemetry.log_format", "pretty")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("TASKFORGE")
                    .separator("__")
                    .try_parsing(true)
                    .source(env_source),
            );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 校验配置取值
    ///
    /// 取值错误会在启动时报告，而不是在工作器处理任务时才暴露
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.task_ttl_seconds == 0 {
            return Err(ConfigError::Message(
                "queue.task_ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if self.queue.result_ttl_multiplier == 0 {
            return Err(ConfigError::Message(
                "queue.result_ttl_multiplier must be at least 1".to_string(),
            ));
        }
        if Duration::from_secs(self.queue.task_ttl_seconds)
            .checked_mul(self.queue.result_ttl_multiplier)
            .is_none()
        {
            return Err(ConfigError::Message(format!(
                "queue.task_ttl_seconds * queue.result_ttl_multiplier overflows ({} * {})",
                self.queue.task_ttl_seconds, self.queue.result_ttl_multiplier
            )));
        }
        // 退避超过记录保留时间时，等待重试的任务会先过期
        if self.retry.max_backoff_seconds > self.queue.task_ttl_seconds {
            return Err(ConfigError::Message(format!(
                "retry.max_backoff_seconds ({}) exceeds queue.task_ttl_seconds ({})",
                self.retry.max_backoff_seconds, self.queue.task_ttl_seconds
            )));
        }
        self.retry_policy()
            .validate()
            .map_err(|e| ConfigError::Message(format!("retry: {}", e)))?;
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Message(
                "worker.concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// 根据配置构建重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_secs(self.retry.max_backoff_seconds),
            backoff_multiplier: self.retry.backoff_multiplier,
            enable_jitter: self.retry.enable_jitter,
            ..RetryPolicy::default()
        }
    }

    /// 根据配置构建队列配置
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            key_prefix: self.store.key_prefix.clone(),
            task_ttl: Duration::from_secs(self.queue.task_ttl_seconds),
            result_ttl_multiplier: self.queue.result_ttl_multiplier,
            default_max_retries: self.queue.default_max_retries,
            retry_policy: self.retry_policy(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.poll_interval_ms)
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
