// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// 重试退避策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 首次重试的退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    /// 默认策略：第n次重试前等待 2^n 秒
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            enable_jitter: false,
        }
    }
}

impl RetryPolicy {
    /// 创建标准重试策略
    pub fn standard() -> Self {
        Self::default()
    }

    /// 计算退避时间
    ///
    /// # 参数
    ///
    /// * `retry_count` - 任务当前已重试的次数（从0开始）
    ///
    /// # 返回值
    ///
    /// `initial_backoff * multiplier^retry_count`，受 `max_backoff` 限制
    pub fn calculate_backoff(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.min(i32::MAX as u32) as i32;
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        // NaN 按上限处理，负值按零处理
        let capped_backoff = backoff_secs
            .min(self.max_backoff.as_secs_f64())
            .max(0.0);

        let final_backoff = if self.enable_jitter && capped_backoff > 0.0 {
            let jitter_range = capped_backoff * self.jitter_factor.clamp(0.0, 1.0);
            let jitter = rand::random_range(-jitter_range..=jitter_range);
            (capped_backoff + jitter).max(0.0)
        } else {
            capped_backoff
        };

        Duration::try_from_secs_f64(final_backoff).unwrap_or(self.max_backoff)
    }

    /// 计算下次重试时间
    ///
    /// 结果超出可表示的时间范围时返回None
    pub fn next_retry_time(
        &self,
        retry_count: u32,
        base_time: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let millis = i64::try_from(self.calculate_backoff(retry_count).as_millis()).ok()?;
        base_time.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
    }

    /// 校验策略参数
    pub fn validate(&self) -> Result<(), String> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff multiplier must be a finite value >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(format!(
                "jitter factor must be within [0.0, 1.0], got {}",
                self.jitter_factor
            ));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(format!(
                "initial backoff {:?} exceeds max backoff {:?}",
                self.initial_backoff, self.max_backoff
            ));
        }
        Ok(())
    }
}
