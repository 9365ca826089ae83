// SPDX-License-Identifier: MIT

//! Transport and DTO layer shared by the daemon and CLI: wire framing,
//! the `Request`/`Response` protocol, and the DTO conversion from durable
//! queue items to transport-shaped records.

pub mod dto;
pub mod log_events;
pub mod request;
pub mod response;
pub mod wire;

pub use dto::{EpisodeStatusDto, EpisodeTotalsDto, ProgressDto, QueueItemDto};
pub use log_events::{LogEvent, LogEventFilter, LogEventHub};
pub use request::Request;
pub use response::{Response, StageHealthEntry};
pub use wire::{decode, encode, read_message, write_message, ProtocolError};
