// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Fleet planning types, the stage DAG, launch configuration and the
//! launcher port.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and rules; no processes are started here

pub mod fleet;
pub mod sequence;
pub mod launcher;
pub mod launch_config;
pub mod events;
