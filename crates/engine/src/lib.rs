// SPDX-License-Identifier: MIT

//! Pipeline engine (C3 + C4): the stage executor and the two-lane
//! workflow manager that schedules items onto it.

pub mod executor;
pub mod workflow;

pub use executor::{ExecuteError, StageExecutor};
pub use workflow::{RetryEpisodeOutcome, RetryEpisodeResult, StatusSummary, WorkflowManager};
