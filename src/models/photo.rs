use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Path prefix of photo references that point into the photo store.
pub const PHOTO_URL_PREFIX: &str = "/api/v1/photos/";

/// A task photo held in the photo store.
///
/// `data` is kept exactly as uploaded (normally a `data:image/...;base64,`
/// URL); the store never decodes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: Uuid,
    pub user_id: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

impl Photo {
    /// The reference stored on a task.
    pub fn url(&self) -> String {
        photo_url(self.id)
    }
}

pub fn photo_url(id: Uuid) -> String {
    format!("{}{}", PHOTO_URL_PREFIX, id)
}

/// Photo store id behind a task's photo reference, if it is one of ours.
pub fn stored_photo_id(reference: &str) -> Option<Uuid> {
    reference
        .strip_prefix(PHOTO_URL_PREFIX)
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// True for inline `data:` image references.
pub fn is_inline_photo(reference: &str) -> bool {
    reference.starts_with("data:")
}
