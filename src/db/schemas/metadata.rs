//! Timestamps and soft-delete flag shared by every stored document
//!
//! The persistence layer stamps these on insert and filters reads on
//! `is_deleted`, so queries never have to remember the exclusion themselves.

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Bookkeeping sub-document embedded in every collection entry
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metadata {
    /// Soft-delete marker; reads treat `true` as absent
    #[serde(default)]
    pub is_deleted: bool,

    /// Last modification time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    /// Insertion time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    /// Fresh metadata stamped with the current time
    pub fn new() -> Self {
        let now = DateTime::now();
        Self {
            is_deleted: false,
            updated_at: Some(now),
            created_at: Some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stamps_timestamps() {
        let meta = Metadata::new();
        assert!(!meta.is_deleted);
        assert_eq!(meta.created_at, meta.updated_at);
        assert!(meta.created_at.is_some());
    }

    #[test]
    fn test_deserializes_from_empty_document() {
        // Documents written before metadata existed must still read back
        let meta: Metadata = bson::from_document(bson::doc! {}).unwrap();
        assert!(!meta.is_deleted);
        assert!(meta.created_at.is_none());
    }
}
