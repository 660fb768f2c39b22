//! Business logic services

pub mod analytics;
pub mod email;

pub use analytics::{
    AnalyticsService, EventQuery, GroupCount, GroupField, Interval, TimeBucket, TrackedMetric,
};
pub use email::Mailer;
