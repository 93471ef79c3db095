use strum_macros::Display;

use crate::internal::models::ScreenshotKey;
use crate::internal::mutation::{MutationError, MutationKind, join_paths};
use crate::internal::usage::UsageLookup;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum NotificationType {
    Info,
    Warning,
    Error,
}

/// A user-facing message with a title
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
}

impl Notification {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(title, message, NotificationType::Info)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(title, message, NotificationType::Warning)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(title, message, NotificationType::Error)
    }

    fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        notification_type: NotificationType,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            notification_type,
        }
    }

    /// Report of a rejected or partially failed mutation.
    ///
    /// Validation problems are warnings; file failures are errors listing one path per line.
    pub fn from_mutation_error(kind: MutationKind, error: &MutationError) -> Self {
        let title = match kind {
            MutationKind::Delete => "Error During Screenshot Deletion",
            MutationKind::Rename => "Error During Screenshot Rename",
            MutationKind::ReplaceWithLatest => "Error During Reference Replacement",
        };
        match error {
            MutationError::Partial { failed, .. } => Self::error(
                title,
                format!("The following files could not be processed:\n{}", join_paths(failed)),
            ),
            other => Self::warning(title, other.to_string()),
        }
    }

    /// Informational result of a navigate-to-usage lookup, `None` when a usage was found.
    pub fn from_usage_lookup(key: &ScreenshotKey, lookup: &UsageLookup) -> Option<Self> {
        match lookup {
            UsageLookup::Found { .. } => None,
            UsageLookup::NoSpecFile => Some(Self::info(
                "No Spec File Found",
                format!("No spec file found for {}", key.spec),
            )),
            UsageLookup::NoMatchingCall => Some(Self::info(
                "Screenshot Usage Not Found",
                format!("No validation call in {} produces {}", key.spec, key.screenshot),
            )),
        }
    }
}
