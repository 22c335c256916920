//! User-visible notification log. Every entry is mirrored to `tracing`.

use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct Notifications {
    entries: Vec<Notification>,
    next_id: u64,
}

impl Notifications {
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) -> u64 {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Notification {
            id,
            timestamp: Utc::now(),
            level,
            message,
        });
        id
    }

    /// Remove one entry. Returns false if it was already gone.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|n| n.id != id);
        self.entries.len() != before
    }

    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Notification> {
        self.entries.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_dismiss() {
        let mut log = Notifications::default();
        let first = log.push(LogLevel::Success, "note created");
        let second = log.push(LogLevel::Error, "connection problem");
        assert_ne!(first, second);
        assert_eq!(log.entries().len(), 2);

        assert!(log.dismiss(first));
        assert!(!log.dismiss(first));
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.last().unwrap().level, LogLevel::Error);
    }
}
