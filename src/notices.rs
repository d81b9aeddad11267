use std::sync::Mutex;

use crate::lock_unpoisoned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Dismissible message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct NoticeBoard {
    entries: Mutex<Vec<Notice>>,
}

impl NoticeBoard {
    pub fn push(&self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice {
            level,
            message: message.into(),
        };
        match level {
            NoticeLevel::Info => tracing::info!(notice = %notice.message),
            NoticeLevel::Warning => tracing::warn!(notice = %notice.message),
            NoticeLevel::Error => tracing::error!(notice = %notice.message),
        }
        lock_unpoisoned(&self.entries).push(notice);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Notice> {
        lock_unpoisoned(&self.entries).clone()
    }

    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *lock_unpoisoned(&self.entries))
    }

    /// Removes the notice at `index`. Returns false when out of range.
    pub fn dismiss(&self, index: usize) -> bool {
        let mut entries = lock_unpoisoned(&self.entries);
        if index < entries.len() {
            entries.remove(index);
            true
        } else {
            false
        }
    }
}
