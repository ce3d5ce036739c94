// user facing messages, one at a time

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(severity: Severity, title: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.to_owned(),
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Severity::Success, "Success", message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, "Error", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, "Validation Error", message)
    }

    /// Error alert showing `err` verbatim, or `fallback` when it has no text.
    pub fn failure(err: &impl std::fmt::Display, fallback: &str) -> Self {
        let message = err.to_string();
        if message.trim().is_empty() {
            Self::error(fallback)
        } else {
            Self::error(message)
        }
    }
}

/// Why a request did not start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blocked {
    /// Another operation of the same screen is outstanding.
    InFlight,
    /// Nothing loaded yet.
    NotReady,
    /// Refused before any network call, with the message to show.
    Rejected(Alert),
}

impl Blocked {
    /// The alert to show, if any. Busy states are silent.
    pub fn into_alert(self) -> Option<Alert> {
        match self {
            Blocked::InFlight | Blocked::NotReady => None,
            Blocked::Rejected(alert) => Some(alert),
        }
    }
}

/// A destructive action waiting for the user's go-ahead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation<T> {
    pub title: String,
    pub prompt: String,
    pub subject: T,
}
