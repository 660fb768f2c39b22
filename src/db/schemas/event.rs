//! Analytics event document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for events
pub const EVENT_COLLECTION: &str = "events";

/// Where an event originated
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    #[default]
    Web,
    Mobile,
    Backend,
    Ios,
    Android,
}

/// Analytics event stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct EventDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Event name, e.g. "page_view"
    pub event_name: String,

    /// Event category, e.g. "navigation"
    pub event_category: String,

    /// User the event belongs to, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Session the event belongs to, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Originating platform
    pub source: EventSource,

    /// Free-form event attributes
    #[serde(default)]
    pub attributes: Document,
}

impl IntoIndexes for EventDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "metadata.created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("created_at_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "event_name": 1 },
                Some(
                    IndexOptions::builder()
                        .name("event_name_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "event_category": 1 },
                Some(
                    IndexOptions::builder()
                        .name("event_category_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_id_index".to_string())
                        .build(),
                ),
            ),
            // Covers "latest events by name" listings
            (
                doc! { "event_name": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("event_name_created_at".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for EventDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EventSource::Ios).unwrap(),
            "\"ios\""
        );
        let parsed: EventSource = serde_json::from_str("\"backend\"").unwrap();
        assert_eq!(parsed, EventSource::Backend);
    }

    #[test]
    fn test_unknown_source_rejected() {
        let parsed: Result<EventSource, _> = serde_json::from_str("\"toaster\"");
        assert!(parsed.is_err());
    }
}
