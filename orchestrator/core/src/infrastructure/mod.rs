// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod process_launcher;
pub mod dry_run;

pub use dry_run::DryRunLauncher;
pub use process_launcher::TokioProcessLauncher;
