//! Metric document schema
//!
//! Stores both caller-submitted custom metrics and values fetched from
//! third-party providers (raw provider response kept for auditing).

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for metrics
pub const METRIC_COLLECTION: &str = "metrics";

/// Metric sample stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MetricDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Metric name, e.g. "temperature"
    pub metric_name: String,

    /// Sampled value
    pub value: f64,

    /// Unit of measurement, e.g. "celsius"
    #[serde(default)]
    pub unit: String,

    /// Free-form tags
    #[serde(default)]
    pub tags: Document,

    /// Where the sample came from ("custom" or a provider name)
    #[serde(default = "default_source")]
    pub source: String,

    /// Raw provider response, kept for third-party metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Document>,
}

fn default_source() -> String {
    "custom".to_string()
}

impl IntoIndexes for MetricDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "metadata.created_at": 1 },
            Some(
                IndexOptions::builder()
                    .name("created_at_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for MetricDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
