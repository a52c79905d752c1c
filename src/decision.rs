//! Decision – czysty wynik silnika moderacji.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Klasa naruszenia, która doprowadziła do decyzji.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Identity,
    Content,
    Raid,
    NewAccount,
    Spam,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "identity policy"),
            Self::Content => write!(f, "content policy"),
            Self::Raid => write!(f, "raid"),
            Self::NewAccount => write!(f, "new account"),
            Self::Spam => write!(f, "spam"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reason {
    pub kind: ViolationKind,
    /// Tekst dla ukaranego (bez słowa kluczowego).
    pub text: String,
    /// Tylko dla logów moderatorskich.
    pub matched_keyword: Option<String>,
}

impl Reason {
    pub fn new(kind: ViolationKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            matched_keyword: None,
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.matched_keyword = Some(keyword.into());
        self
    }
}

/// Wiadomość do usunięcia razem z karą.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    DeleteMessage {
        message: MessageRef,
        reason: Reason,
    },
    Timeout {
        duration: Duration,
        reason: Reason,
        /// Kanał, w którym padł spam (publiczna notka).
        channel_id: Option<u64>,
    },
    Kick {
        reason: Reason,
    },
    Ban {
        reason: Reason,
        delete_message: Option<MessageRef>,
    },
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Allow => Severity::None,
            Self::DeleteMessage { .. } | Self::Timeout { .. } => Severity::Low,
            Self::Kick { .. } => Severity::Medium,
            Self::Ban { .. } => Severity::High,
        }
    }

    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Self::Allow => None,
            Self::DeleteMessage { reason, .. }
            | Self::Timeout { reason, .. }
            | Self::Kick { reason }
            | Self::Ban { reason, .. } => Some(reason),
        }
    }

    pub fn message_to_delete(&self) -> Option<MessageRef> {
        match self {
            Self::DeleteMessage { message, .. } => Some(*message),
            Self::Ban { delete_message, .. } => *delete_message,
            _ => None,
        }
    }

    /// Ban/kick usuwa użytkownika z serwera – sprzątamy po nim historię.
    pub fn purges_history(&self) -> bool {
        matches!(self, Self::Ban { .. } | Self::Kick { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::DeleteMessage { .. } => "delete",
            Self::Timeout { .. } => "timeout",
            Self::Kick { .. } => "kick",
            Self::Ban { .. } => "ban",
        }
    }
}
