// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod handler;
pub mod manager;
pub mod task_worker;
pub mod worker;

pub use worker::Worker;
