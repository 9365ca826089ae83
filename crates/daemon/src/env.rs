// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the daemon.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve state directory: `SPINDLE_STATE_DIR` > `XDG_STATE_HOME/spindle` > `~/.local/state/spindle`.
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("SPINDLE_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("spindle"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/spindle"))
}

/// Default IPC timeout applied to both reads and writes of a single message.
pub fn ipc_timeout() -> Duration {
    std::env::var("SPINDLE_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Shutdown drain grace period: how long lane loops get to finish their
/// current item before the root context is torn down anyway.
pub fn drain_timeout() -> Duration {
    std::env::var("SPINDLE_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Poll interval for the `log_tail` follow loop; bounded at 250ms per §4.6.
pub fn log_tail_poll_interval() -> Duration {
    std::env::var("SPINDLE_LOG_TAIL_POLL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(|ms| Duration::from_millis(ms.min(250)))
        .unwrap_or(Duration::from_millis(200))
}
