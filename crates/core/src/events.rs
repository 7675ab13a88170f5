//! One-way event stream from the core to whatever renders a run.
//!
//! The controller and the pipeline never touch a terminal or a UI; they push
//! [`MergeEvent`]s into an unbounded channel and mirror each record to
//! `tracing` at debug level. A sink without a receiver only logs.

use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;

use crate::models::RepoOutcome;

/// Severity of a [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "ok"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single user-facing log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    /// Repository display name, `None` for batch-level messages.
    pub repo: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum MergeEvent {
    Log(LogRecord),
    /// Something the user must see even when logs are hidden.
    Notification { title: String, message: String },
    RepoStarted {
        index: usize,
        total: usize,
        name: String,
    },
    RepoFinished(RepoOutcome),
}

/// Sender side of the event stream.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<MergeEvent>>,
}

impl EventSink {
    /// A sink plus the receiver the host drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MergeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that only logs through `tracing`.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: MergeEvent) {
        if let Some(ref tx) = self.tx {
            // A dropped receiver just means nobody is watching.
            let _ = tx.send(event);
        }
    }

    pub fn log(&self, level: LogLevel, repo: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        debug!(%level, repo = repo.unwrap_or("-"), "{}", message);
        self.emit(MergeEvent::Log(LogRecord {
            level,
            repo: repo.map(str::to_string),
            message,
        }));
    }

    pub fn info(&self, repo: &str, message: impl Into<String>) {
        self.log(LogLevel::Info, Some(repo), message);
    }

    pub fn success(&self, repo: &str, message: impl Into<String>) {
        self.log(LogLevel::Success, Some(repo), message);
    }

    pub fn warn(&self, repo: &str, message: impl Into<String>) {
        self.log(LogLevel::Warn, Some(repo), message);
    }

    pub fn error(&self, repo: &str, message: impl Into<String>) {
        self.log(LogLevel::Error, Some(repo), message);
    }

    pub fn notify(&self, title: impl Into<String>, message: impl Into<String>) {
        let title = title.into();
        let message = message.into();
        debug!(%title, "{}", message);
        self.emit(MergeEvent::Notification { title, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.info("svc-a", "fetching");
        sink.notify("AI merge", "no key");
        sink.emit(MergeEvent::RepoFinished(RepoOutcome::new("svc-a")));
        drop(sink);

        match rx.recv().await {
            Some(MergeEvent::Log(record)) => {
                assert_eq!(record.level, LogLevel::Info);
                assert_eq!(record.repo.as_deref(), Some("svc-a"));
                assert_eq!(record.message, "fetching");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            rx.recv().await,
            Some(MergeEvent::Notification { ref title, .. }) if title == "AI merge"
        ));
        assert!(matches!(rx.recv().await, Some(MergeEvent::RepoFinished(_))));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_disabled_and_dropped_receiver_do_not_panic() {
        EventSink::disabled().error("svc-a", "boom");

        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.warn("svc-a", "nobody listening");
    }
}
