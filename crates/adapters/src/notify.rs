// SPDX-License-Identifier: MIT

//! Operator-facing notification adapter. Grounded on the teacher's
//! `NotifyAdapter` trait: one generic `notify` method, a desktop impl
//! wrapping `notify-rust`, and a trait-with-no-op-default shape for the
//! event-specific helpers.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Adapter for sending operator-facing notifications about queue events.
/// Every method has a default no-op body so a collaborator can implement
/// only the events it cares about (the "no-op default implementation"
/// design note applies to every external collaborator).
#[async_trait]
pub trait NotifierAdapter: Send + Sync + 'static {
    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError>;

    async fn event_organization_completed(&self, disc_title: &str, final_path: &str) -> Result<(), NotifyError> {
        self.notify("Spindle: organized", &format!("{disc_title} -> {final_path}")).await
    }

    async fn event_unidentified_media(&self, disc_title: &str) -> Result<(), NotifyError> {
        self.notify("Spindle: needs review", &format!("{disc_title} could not be identified")).await
    }

    async fn event_item_failed(&self, disc_title: &str, error_message: &str) -> Result<(), NotifyError> {
        self.notify("Spindle: failed", &format!("{disc_title}: {error_message}")).await
    }
}

/// Desktop notification adapter using notify-rust.
///
/// On macOS, `notify-rust` uses `mac-notification-sys` (Cocoa bindings) to
/// send notifications via the Notification Center. The first notification
/// triggers `ensure_application_set()` which runs an AppleScript to look up
/// a bundle identifier; in a daemon context without Automation permissions
/// that AppleScript blocks forever, so the bundle identifier is pre-set at
/// construction time to bypass the lookup entirely.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopNotifierAdapter;

impl DesktopNotifierAdapter {
    pub fn new() -> Self {
        #[cfg(target_os = "macos")]
        {
            let _ = mac_notification_sys::set_application("com.apple.Terminal");
        }
        Self
    }
}

#[async_trait]
impl NotifierAdapter for DesktopNotifierAdapter {
    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        let title = title.to_string();
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            tracing::info!(%title, %message, "sending desktop notification");
            match notify_rust::Notification::new().summary(&title).body(&message).show() {
                Ok(_) => tracing::info!(%title, "desktop notification sent"),
                Err(e) => tracing::warn!(%title, error = %e, "desktop notification failed"),
            }
        });
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{NotifierAdapter, NotifyError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct NotifyCall {
        pub title: String,
        pub message: String,
    }

    struct FakeState {
        calls: Vec<NotifyCall>,
    }

    #[derive(Clone)]
    pub struct FakeNotifierAdapter {
        inner: Arc<Mutex<FakeState>>,
    }

    impl Default for FakeNotifierAdapter {
        fn default() -> Self {
            Self { inner: Arc::new(Mutex::new(FakeState { calls: Vec::new() })) }
        }
    }

    impl FakeNotifierAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<NotifyCall> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl NotifierAdapter for FakeNotifierAdapter {
        async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
            self.inner.lock().calls.push(NotifyCall { title: title.to_string(), message: message.to_string() });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifierAdapter, NotifyCall};
