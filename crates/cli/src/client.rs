// SPDX-License-Identifier: MIT

//! Thin IPC client: connects to the daemon's Unix socket and exchanges
//! one length-framed JSON-RPC request/response pair per call, mirroring
//! the teacher's `DaemonClient` connect/send split.

use std::path::PathBuf;
use std::process::Command;

use spindle_wire::{read_message, write_message, Request, Response};
use tokio::net::UnixStream;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("daemon is not running")]
    NotRunning,
    #[error(transparent)]
    Protocol(#[from] spindle_wire::ProtocolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn is_not_running(&self) -> bool {
        matches!(self, ClientError::NotRunning)
    }
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connect to an already-running daemon; fails fast if the socket is
    /// absent or refuses the connection rather than blocking on retries.
    pub async fn connect() -> Result<Self, ClientError> {
        let config = spindle_daemon::Config::load().map_err(|_| ClientError::NotRunning)?;
        if !config.socket_path.exists() {
            return Err(ClientError::NotRunning);
        }
        // Probe the socket so a stale file left behind by a crashed daemon
        // is reported as "not running" instead of an opaque IO error.
        match UnixStream::connect(&config.socket_path).await {
            Ok(_) => Ok(Self { socket_path: config.socket_path }),
            Err(_) => Err(ClientError::NotRunning),
        }
    }

    /// Connect, spawning `spindled` in the background first if no daemon
    /// answers. Mirrors the teacher's `connect_or_start`.
    pub async fn connect_or_start() -> Result<Self, ClientError> {
        if let Ok(client) = Self::connect().await {
            return Ok(client);
        }

        let spindled_path = find_spindled_binary();
        Command::new(&spindled_path).spawn()?;

        for _ in 0..20 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            if let Ok(client) = Self::connect().await {
                return Ok(client);
            }
        }
        Err(ClientError::NotRunning)
    }

    async fn call(&self, request: Request) -> Result<Response, ClientError> {
        let mut stream = UnixStream::connect(&self.socket_path).await?;
        write_message(&mut stream, &request).await?;
        let response: Response = read_message(&mut stream).await?;
        Ok(response)
    }

    pub async fn hello(&self) -> Result<String, ClientError> {
        let version = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH")).to_string();
        match self.call(Request::Hello { version }).await? {
            Response::Hello { version } => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    pub async fn stop(&self) -> Result<String, ClientError> {
        match self.call(Request::Stop).await? {
            Response::Stopped { message } => Ok(message),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&self) -> Result<Response, ClientError> {
        self.call(Request::Status).await
    }

    pub async fn queue_list(&self, statuses: Option<Vec<String>>) -> Result<Response, ClientError> {
        self.call(Request::QueueList { statuses }).await
    }

    pub async fn queue_describe(&self, id: spindle_core::ItemId) -> Result<Response, ClientError> {
        self.call(Request::QueueDescribe { id }).await
    }

    pub async fn queue_clear(&self) -> Result<Response, ClientError> {
        self.call(Request::QueueClear).await
    }

    pub async fn queue_clear_completed(&self) -> Result<Response, ClientError> {
        self.call(Request::QueueClearCompleted).await
    }

    pub async fn queue_clear_failed(&self) -> Result<Response, ClientError> {
        self.call(Request::QueueClearFailed).await
    }

    pub async fn queue_remove(&self, ids: Vec<spindle_core::ItemId>) -> Result<Response, ClientError> {
        self.call(Request::QueueRemove { ids }).await
    }

    pub async fn queue_reset(&self) -> Result<Response, ClientError> {
        self.call(Request::QueueReset).await
    }

    pub async fn queue_retry(&self, ids: Option<Vec<spindle_core::ItemId>>) -> Result<Response, ClientError> {
        self.call(Request::QueueRetry { ids }).await
    }

    pub async fn queue_retry_episode(&self, id: spindle_core::ItemId, episode_key: String) -> Result<Response, ClientError> {
        self.call(Request::QueueRetryEpisode { id, episode_key }).await
    }

    pub async fn queue_stop(&self, ids: Vec<spindle_core::ItemId>) -> Result<Response, ClientError> {
        self.call(Request::QueueStop { ids }).await
    }

    pub async fn log_tail(&self, offset: i64, limit: usize, follow: bool, wait_millis: u64) -> Result<Response, ClientError> {
        self.call(Request::LogTail { offset, limit, follow, wait_millis }).await
    }

    pub async fn disc_insert(
        &self,
        title: String,
        source_path: Option<String>,
        fingerprint: String,
        allow_duplicate: bool,
        priority: i32,
    ) -> Result<Response, ClientError> {
        self.call(Request::DiscInsert { title, source_path, fingerprint, allow_duplicate, priority }).await
    }

    pub async fn disc_pause(&self) -> Result<Response, ClientError> {
        self.call(Request::DiscPause).await
    }

    pub async fn disc_resume(&self) -> Result<Response, ClientError> {
        self.call(Request::DiscResume).await
    }

    pub async fn database_health(&self) -> Result<Response, ClientError> {
        self.call(Request::DatabaseHealth).await
    }

    pub async fn test_notification(&self) -> Result<Response, ClientError> {
        self.call(Request::TestNotification).await
    }
}

fn unexpected(response: Response) -> ClientError {
    ClientError::Io(std::io::Error::new(std::io::ErrorKind::Other, format!("unexpected response: {response:?}")))
}

fn find_spindled_binary() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("spindled");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("spindled")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_not_running_matches_only_that_variant() {
        assert!(ClientError::NotRunning.is_not_running());
        let io_err = ClientError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(!io_err.is_not_running());
    }

    #[test]
    fn find_spindled_binary_falls_back_to_bare_name_off_path() {
        // current_exe() in a test binary has no "spindled" sibling, so the
        // bare-name PATH fallback is what we should get here.
        let path = find_spindled_binary();
        assert_eq!(path.file_name().unwrap(), "spindled");
    }
}
