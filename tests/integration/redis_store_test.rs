// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! Redis存储测试，需要本地Docker环境：`cargo test -- --ignored`

use redis::AsyncCommands;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use taskforge::domain::models::task::{TaskStatus, TaskType};
use taskforge::domain::repositories::task_store::TaskStore;
use taskforge::infrastructure::cache::redis_client::RedisClient;
use taskforge::infrastructure::repositories::redis_task_store::RedisTaskStore;
use taskforge::queue::task_queue::{EnqueueOptions, QueueConfig, StoreTaskQueue, TaskQueue};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};

struct RedisFixture {
    client: RedisClient,
    // Keep node alive
    _node: ContainerAsync<GenericImage>,
}

async fn start_redis() -> RedisFixture {
    let node = GenericImage::new("redis", "7-alpine")
        .start()
        .await
        .expect("Failed to start Redis");
    let port = node
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get Redis port");
    let client = RedisClient::new(&format!("redis://127.0.0.1:{}", port)).unwrap();

    // Retry until the server accepts connections
    let mut ready = false;
    for _ in 0..20 {
        if client.get("taskforge:ping").await.is_ok() {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    assert!(ready, "Redis never became ready");

    RedisFixture { client, _node: node }
}

#[tokio::test]
#[ignore]
async fn test_zrem_count_is_claim_signal() {
    let redis = start_redis().await;
    let store = RedisTaskStore::new(redis.client.clone());

    store.add("q", "a", 1.0).await.unwrap();
    store.add("q", "b", 3.0).await.unwrap();
    store.add("q", "c", 2.0).await.unwrap();

    assert_eq!(store.reverse_range("q", 0, -1).await.unwrap(), vec!["b", "c", "a"]);
    assert_eq!(store.reverse_range("q", 0, 0).await.unwrap(), vec!["b"]);
    assert_eq!(store.cardinality("q").await.unwrap(), 3);

    assert!(store.remove("q", "b").await.unwrap());
    assert!(!store.remove("q", "b").await.unwrap());
    assert!(!store.remove("missing", "b").await.unwrap());
    assert_eq!(store.cardinality("q").await.unwrap(), 2);
}

#[tokio::test]
#[ignore]
async fn test_sub_second_ttl_rounds_up() {
    let redis = start_redis().await;
    let store = RedisTaskStore::new(redis.client.clone());

    store
        .set("task:short", "{}", Duration::from_millis(10))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.get("task:short").await.unwrap().as_deref(), Some("{}"));

    let mut con = redis.client.get_connection().await.unwrap();
    let ttl: i64 = con.ttl("task:short").await.unwrap();
    assert!((0..=1).contains(&ttl));

    store.add("q", "a", 1.0).await.unwrap();
    store.expire("q", Duration::from_millis(1)).await.unwrap();
    let ttl: i64 = con.ttl("q").await.unwrap();
    assert!((0..=1).contains(&ttl));

    store.set("task:long", "{}", Duration::MAX).await.unwrap();
    let ttl: i64 = con.ttl("task:long").await.unwrap();
    assert!(ttl > 86_400);

    let mut keys = store.keys("task:*").await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["task:long", "task:short"]);

    store.delete("task:long").await.unwrap();
    assert!(store.get("task:long").await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_queue_lifecycle_over_redis() {
    let redis = start_redis().await;
    let mut config = QueueConfig::default();
    config.retry_policy.initial_backoff = Duration::ZERO;
    let queue = StoreTaskQueue::new(Arc::new(RedisTaskStore::new(redis.client.clone())), config);

    let low = queue
        .enqueue(TaskType::SendEmail, json!({"to": "a@example.com"}), EnqueueOptions::default())
        .await
        .unwrap();
    let high = queue
        .enqueue(
            TaskType::SendEmail,
            json!({"to": "b@example.com"}),
            EnqueueOptions::default().with_priority(5),
        )
        .await
        .unwrap();

    let claimed = queue.get_next_task(TaskType::SendEmail).await.unwrap().unwrap();
    assert_eq!(claimed.id, high);
    assert_eq!(claimed.status, TaskStatus::Processing);

    queue
        .update_task_status(high, TaskStatus::Failed, None, Some("timeout".to_string()))
        .await
        .unwrap();
    assert!(queue.retry_task(high).await.unwrap());

    let retried = queue.get_next_task(TaskType::SendEmail).await.unwrap().unwrap();
    assert_eq!(retried.id, high);
    assert_eq!(retried.retry_count, 1);

    queue
        .update_task_status(high, TaskStatus::Completed, Some(json!({"sent": true})), None)
        .await
        .unwrap();
    let result = queue.get_task_result(high).await.unwrap().unwrap();
    assert_eq!(result.result, json!({"sent": true}));

    let next = queue.get_next_task(TaskType::SendEmail).await.unwrap().unwrap();
    assert_eq!(next.id, low);
    assert!(queue.get_next_task(TaskType::SendEmail).await.unwrap().is_none());
}
