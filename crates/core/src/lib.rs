// SPDX-License-Identifier: MIT

//! Domain model shared by every Spindle crate: queue items, the rip-spec
//! envelope, status/lane state machine, stage errors, WAL events, and
//! `spindle.toml` settings.

#[macro_use]
pub mod macros;

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod item;
pub mod progress;
pub mod ripspec;
pub mod status;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, Settings, ToolPaths};
pub use error::{BoxError, ErrorKind, StageError};
pub use event::Event;
pub use fingerprint::Fingerprint;
pub use item::{ItemId, QueueItem};
pub use progress::ProgressRecord;
pub use ripspec::{Asset, AssetKind, AssetStatus, Episode, RipSpecEnvelope, Title};
pub use status::{ItemStatus, Lane};
