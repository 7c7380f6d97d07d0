//! Shared identifier types.

use uuid::Uuid;

pub type UserId = Uuid;
pub type ImageId = Uuid;

/// Abbreviate a UUID for log fields (first segment only).
pub fn abbrev_uuid(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}
