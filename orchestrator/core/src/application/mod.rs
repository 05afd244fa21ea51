// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod bringup;
pub mod sequencer;
pub mod fleet_launch;

pub use bringup::{BringupCatalog, LaunchSettings};
pub use fleet_launch::{FleetLaunchError, FleetLaunchService, LaunchOutcome, PreparedLaunch};
pub use sequencer::{FleetSequencer, SequenceError, SequenceReport, UnitSource};
