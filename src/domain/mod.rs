//! Domain layer: entities, identifiers and validation rules.
//!
//! Nothing in this module performs I/O. Services load and store these
//! types through [`crate::persistence::Store`] and decide *when* the
//! rules apply; the types themselves decide *what* is valid.

pub mod card;
pub mod event;
pub mod ids;
pub mod media;
pub mod records;
pub mod user;

use std::fmt;

pub use card::{CardPage, CardShare, ShareStatus};
pub use event::{Event, EventDraft, EventType};
pub use ids::{EventId, MediaId, PageId, ShareToken, UserId};
pub use media::{EventMedia, MediaKind, MediaUpload};
pub use records::{ImportLog, Reflection, ReminderLog, ReminderStatus};
pub use user::{User, VerificationCode};

/// A rule violation tied to one input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Name of the offending field.
    pub field: &'static str,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error for `field`.
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}
