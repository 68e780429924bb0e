use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Success,
    Warn,
    Error,
}

impl NoticeKind {
    /// How long a notice of this kind stays visible.
    pub fn ttl(&self) -> Duration {
        match self {
            NoticeKind::Info | NoticeKind::Success => Duration::from_secs(3),
            NoticeKind::Warn => Duration::from_secs(4),
            NoticeKind::Error => Duration::from_secs(5),
        }
    }
}

/// A transient success or error message for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    pub raised_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(kind: NoticeKind, text: impl Into<String>, raised_at: DateTime<Utc>) -> Self {
        Self { kind, text: text.into(), raised_at }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        // a clock that went backwards yields a negative span; keep the notice
        (now - self.raised_at).to_std().map_or(false, |elapsed| elapsed >= self.kind.ttl())
    }
}
