//! # Notification Module
//!
//! Fire-and-forget user notifications raised by the session.

use tracing::{error, info, warn};

/// How prominently a notification should be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Sink for user-visible notifications
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str, severity: Severity);
}

/// Notifier that writes to the log, used by the terminal dashboard
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!(target: "notify", "{}: {}", title, message),
            Severity::Warning => warn!(target: "notify", "{}: {}", title, message),
            Severity::Error => error!(target: "notify", "{}: {}", title, message),
        }
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Notifier that records everything it is given
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        pub sent: Arc<Mutex<Vec<(String, String, Severity)>>>,
    }

    impl RecordingNotifier {
        pub fn titles(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(t, _, _)| t.clone()).collect()
        }

        pub fn last(&self) -> Option<(String, String, Severity)> {
            self.sent.lock().unwrap().last().cloned()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, message: &str, severity: Severity) {
            self.sent
                .lock()
                .unwrap()
                .push((title.to_string(), message.to_string(), severity));
        }
    }
}
