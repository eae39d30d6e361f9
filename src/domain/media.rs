//! Media attached to events and the rules uploads must satisfy.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{EventId, MediaId, UserId, ValidationError};

/// Maximum number of media objects attached to one event.
pub const MAX_MEDIA_PER_EVENT: usize = 3;

/// Upper bound for image uploads (50 MiB).
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// Upper bound for audio uploads (10 MiB).
pub const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

/// Content types accepted for uploads.
pub const ALLOWED_CONTENT_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "audio/mpeg",
    "audio/wav",
    "audio/flac",
];

/// Broad media category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A still image.
    Image,
    /// An audio clip.
    Audio,
}

impl MediaKind {
    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }

    /// Size limit for this kind.
    #[must_use]
    pub const fn max_bytes(self) -> usize {
        match self {
            Self::Image => MAX_IMAGE_BYTES,
            Self::Audio => MAX_AUDIO_BYTES,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            other => Err(ValidationError::new(
                "media_type",
                format!("unknown media kind '{other}'"),
            )),
        }
    }
}

/// A media object stored externally and referenced by an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMedia {
    /// Unique identifier.
    pub id: MediaId,
    /// Owning event.
    pub event_id: EventId,
    /// Public URL of the object.
    pub url: String,
    /// Object key inside the bucket.
    pub storage_path: String,
    /// Image or audio.
    pub kind: MediaKind,
    /// MIME type recorded at upload.
    pub content_type: String,
    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
}

/// A file received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    /// Original file name as sent by the client.
    pub file_name: String,
    /// Declared MIME type.
    pub content_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    /// Checks the content type and size and returns the media kind.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for disallowed types or oversized files.
    pub fn validate(&self) -> Result<MediaKind, ValidationError> {
        if !ALLOWED_CONTENT_TYPES.contains(&self.content_type.as_str()) {
            return Err(ValidationError::new(
                "media_files",
                format!("invalid file type for '{}'", self.file_name),
            ));
        }
        let kind = if self.content_type.starts_with("image/") {
            MediaKind::Image
        } else {
            MediaKind::Audio
        };
        if self.bytes.len() > kind.max_bytes() {
            return Err(ValidationError::new(
                "media_files",
                format!(
                    "{} '{}' exceeds {} MB",
                    kind,
                    self.file_name,
                    kind.max_bytes() / 1024 / 1024
                ),
            ));
        }
        Ok(kind)
    }

    /// File name reduced to a safe object-key segment.
    #[must_use]
    pub fn sanitized_file_name(&self) -> String {
        let base = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let cleaned: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if cleaned.trim_matches('_').is_empty() {
            "upload".to_string()
        } else {
            cleaned
        }
    }
}

/// Builds the object key `{user}/{event}/{suffix}_{file}` for an upload.
#[must_use]
pub fn object_key(user_id: UserId, event_id: EventId, upload: &MediaUpload) -> String {
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!(
        "{user_id}/{event_id}/{suffix}_{}",
        upload.sanitized_file_name()
    )
}

/// Rebases an existing object key onto another event's prefix, keeping
/// the file segment.
#[must_use]
pub fn rebased_key(user_id: UserId, event_id: EventId, storage_path: &str) -> String {
    let file = storage_path.rsplit('/').next().unwrap_or(storage_path);
    format!("{user_id}/{event_id}/{file}")
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn upload(content_type: &str, len: usize) -> MediaUpload {
        MediaUpload {
            file_name: "../party pic.png".to_string(),
            content_type: content_type.to_string(),
            bytes: vec![0; len],
        }
    }

    #[test]
    fn accepts_allowed_types() {
        assert_eq!(upload("image/png", 10).validate().ok(), Some(MediaKind::Image));
        assert_eq!(upload("audio/flac", 10).validate().ok(), Some(MediaKind::Audio));
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(upload("application/pdf", 10).validate().is_err());
    }

    #[test]
    fn audio_limit_is_smaller_than_image_limit() {
        assert!(upload("audio/mpeg", MAX_AUDIO_BYTES + 1).validate().is_err());
        assert!(upload("image/jpeg", MAX_AUDIO_BYTES + 1).validate().is_ok());
    }

    #[test]
    fn object_key_is_prefixed_and_sanitized() {
        let user = UserId::new();
        let event = EventId::new();
        let key = object_key(user, event, &upload("image/png", 1));
        assert!(key.starts_with(&format!("{user}/{event}/")));
        assert!(key.ends_with("_party_pic.png"));
        assert!(!key.contains(".."));
    }

    #[test]
    fn rebased_key_keeps_file_segment() {
        let user = UserId::new();
        let event = EventId::new();
        let key = rebased_key(user, event, "a/b/1234abcd_cake.jpg");
        assert_eq!(key, format!("{user}/{event}/1234abcd_cake.jpg"));
    }
}
