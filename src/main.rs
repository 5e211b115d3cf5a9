// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use taskforge::config::settings::{Settings, StoreBackend};
use taskforge::domain::models::task::TaskType;
use taskforge::domain::repositories::task_store::TaskStore;
use taskforge::infrastructure::cache::redis_client::RedisClient;
use taskforge::infrastructure::metrics;
use taskforge::infrastructure::repositories::memory_task_store::InMemoryTaskStore;
use taskforge::infrastructure::repositories::redis_task_store::RedisTaskStore;
use taskforge::queue::task_queue::{EnqueueOptions, StoreTaskQueue, TaskQueue};
use taskforge::utils::telemetry;
use taskforge::workers::handler::{HandlerError, TaskHandler};
use taskforge::workers::manager::WorkerManager;
use taskforge::workers::task_worker::TaskWorker;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "taskforge", about = "Background task queue CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a task
    Enqueue {
        /// Task type: send_email, import_job, github_sync
        task_type: String,
        /// Task payload as JSON
        data: String,
        /// Priority in [-500, 500], higher runs first
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        priority: i32,
        /// Maximum number of retries
        #[arg(long)]
        max_retries: Option<u32>,
        /// Delay before the task becomes eligible, in seconds
        #[arg(long, default_value = "0")]
        delay: u64,
    },
    /// Show a task record
    Show {
        /// Task UUID
        id: Uuid,
    },
    /// Show the stored result of a completed task
    Result {
        /// Task UUID
        id: Uuid,
    },
    /// Show pending counts per task type
    Stats {
        /// Restrict to one task type
        #[arg(long)]
        r#type: Option<String>,
    },
    /// Run a worker that logs and acknowledges every task
    Worker {
        /// Number of polling loops, overrides worker.concurrency
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

/// 记录任务内容并原样返回的处理器，用于验证部署
struct LoggingHandler {
    task_type: TaskType,
}

#[async_trait]
impl TaskHandler for LoggingHandler {
    async fn handle(&self, data: Value) -> Result<Value, HandlerError> {
        info!(task_type = %self.task_type, payload = %data, "Received task");
        Ok(serde_json::json!({ "acknowledged": true, "data": data }))
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

fn parse_task_type(name: &str) -> anyhow::Result<TaskType> {
    name.parse::<TaskType>()
        .with_context(|| format!("Invalid task type '{}'", name))
}

/// 主函数
///
/// 加载配置，选择存储后端并执行子命令
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::new().context("Failed to load configuration")?;
    telemetry::init_telemetry(settings.telemetry.log_format);

    if settings.metrics.enabled {
        metrics::init_metrics(&settings.metrics.listen_addr);
    }

    match settings.store.backend {
        StoreBackend::Redis => {
            let client = RedisClient::new(&settings.redis.url)
                .with_context(|| format!("Invalid Redis URL {}", settings.redis.url))?;
            info!("Redis client initialized");
            run(cli.command, &settings, Arc::new(RedisTaskStore::new(client))).await
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store, tasks are lost when the process exits");
            run(cli.command, &settings, Arc::new(InMemoryTaskStore::new())).await
        }
    }
}

async fn run<S: TaskStore + 'static>(
    command: Commands,
    settings: &Settings,
    store: Arc<S>,
) -> anyhow::Result<()> {
    let queue = Arc::new(StoreTaskQueue::new(store, settings.queue_config()));

    match command {
        Commands::Enqueue {
            task_type,
            data,
            priority,
            max_retries,
            delay,
        } => {
            let task_type = parse_task_type(&task_type)?;
            let data: Value = serde_json::from_str(&data).context("Payload is not valid JSON")?;
            let mut options = EnqueueOptions::default()
                .with_priority(priority)
                .with_delay_seconds(delay);
            if let Some(max_retries) = max_retries {
                options = options.with_max_retries(max_retries);
            }
            let id = queue.enqueue(task_type, data, options).await?;
            println!("{}", id);
        }
        Commands::Show { id } => match queue.get_task(id).await? {
            Some(task) => print_json(&task)?,
            None => anyhow::bail!("Task {} not found", id),
        },
        Commands::Result { id } => match queue.get_task_result(id).await? {
            Some(result) => print_json(&result)?,
            None => anyhow::bail!("No result stored for task {}", id),
        },
        Commands::Stats { r#type } => {
            let filter = r#type.as_deref().map(parse_task_type).transpose()?;
            let stats = queue.get_queue_stats(filter).await?;
            print_json(&stats)?;
        }
        Commands::Worker { concurrency } => {
            let worker = TaskWorker::new(queue).with_poll_interval(settings.poll_interval());
            for task_type in TaskType::ALL {
                worker.register_handler(task_type, LoggingHandler { task_type });
            }

            let mut manager = WorkerManager::new(Arc::new(worker));
            manager.start_workers(concurrency.unwrap_or(settings.worker.concurrency).max(1));
            manager.wait_for_shutdown().await;
        }
    }

    Ok(())
}
