// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use taskforge::config::settings::LogFormat;
use taskforge::utils::telemetry;

#[test]
fn test_telemetry_initialization_is_idempotent() {
    // 初始化遥测系统
    telemetry::init_telemetry(LogFormat::Pretty);
    // 第二次初始化不应panic
    telemetry::init_telemetry(LogFormat::Json);

    tracing::debug!("This is a debug message");
    tracing::info!(task_type = "send_email", "Structured message");
}
