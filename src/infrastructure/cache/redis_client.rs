// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};

/// Redis客户端
///
/// 提供对Redis数据库的异步操作接口，覆盖任务存储所需的键值与有序集合命令
#[derive(Clone)]
pub struct RedisClient {
    /// Redis客户端
    client: redis::Client,
}

impl RedisClient {
    /// 创建新的Redis客户端实例
    ///
    /// 只解析连接URL，不会立即建立连接
    ///
    /// # 参数
    ///
    /// * `redis_url` - Redis连接URL
    pub fn new(redis_url: &str) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// 获取多路复用连接
    pub async fn get_connection(&self) -> RedisResult<MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await
    }

    /// 获取指定键的值
    pub async fn get(&self, key: &str) -> RedisResult<Option<String>> {
        let mut con = self.get_connection().await?;
        con.get(key).await
    }

    /// 设置键值对并指定过期时间
    ///
    /// # 参数
    ///
    /// * `key` - 键
    /// * `value` - 值
    /// * `ttl_seconds` - 过期时间（秒）
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> RedisResult<()> {
        let mut con = self.get_connection().await?;
        con.set_ex::<_, _, ()>(key, value, ttl_seconds).await
    }

    /// 删除键
    pub async fn del(&self, key: &str) -> RedisResult<()> {
        let mut con = self.get_connection().await?;
        con.del::<_, ()>(key).await
    }

    /// 设置键的过期时间
    pub async fn expire(&self, key: &str, seconds: u64) -> RedisResult<()> {
        let mut con = self.get_connection().await?;
        con.expire::<_, ()>(key, seconds as i64).await
    }

    /// 向有序集合添加成员
    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> RedisResult<()> {
        let mut con = self.get_connection().await?;
        con.zadd::<_, _, _, ()>(key, member, score).await
    }

    /// 从有序集合移除成员，返回实际移除的数量
    pub async fn zrem(&self, key: &str, member: &str) -> RedisResult<i64> {
        let mut con = self.get_connection().await?;
        con.zrem(key, member).await
    }

    /// 按分数倒序获取区间成员
    pub async fn zrevrange(&self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>> {
        let mut con = self.get_connection().await?;
        con.zrevrange(key, start, stop).await
    }

    /// 获取有序集合成员数量
    pub async fn zcard(&self, key: &str) -> RedisResult<u64> {
        let mut con = self.get_connection().await?;
        con.zcard(key).await
    }

    /// 按模式列出键
    pub async fn keys(&self, pattern: &str) -> RedisResult<Vec<String>> {
        let mut con = self.get_connection().await?;
        con.keys(pattern).await
    }
}
