// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 基于键值存储的后台任务队列与轮询工作器
//!
//! 生产者通过 [`queue::task_queue::TaskQueue`] 入队任务，
//! [`workers::task_worker::TaskWorker`] 按分类领取并交给注册的处理器执行。

pub mod config;

pub mod domain;

pub mod infrastructure;

pub mod queue;

pub mod utils;

pub mod workers;
