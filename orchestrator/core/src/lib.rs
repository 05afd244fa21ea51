// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fleet Launch Core
//!
//! Plans and sequences the bring-up of a simulated robot fleet.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Robot count policy, the stage DAG, and the sequencer that
//!   walks it against a process launcher

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
