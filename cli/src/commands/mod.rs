// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Fleet Launch CLI

pub mod config;
pub mod launch;
pub mod plan;

pub use self::config::ConfigCommand;
pub use self::launch::LaunchArgs;
pub use self::plan::PlanArgs;
