//! Document schemas for MongoDB collections

pub mod event;
pub mod metadata;
pub mod metric;
pub mod user;

pub use event::{EventDoc, EventSource, EVENT_COLLECTION};
pub use metadata::Metadata;
pub use metric::{MetricDoc, METRIC_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};
