//! Analytics service
//!
//! Event and metric ingestion, aggregation queries, and third-party metric
//! fetching through the shared HTTP client.

use bson::{doc, oid::ObjectId, Bson, Document};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::client::{HttpClientManager, RequestOptions};
use crate::db::schemas::{EventDoc, MetricDoc, EVENT_COLLECTION, METRIC_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{Result, TallyError};

/// Filters and pagination for event listings
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub event_name: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// 1-based page number
    pub page: u64,
    pub limit: i64,
}

/// Fields events can be grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    EventName,
    EventCategory,
    Source,
}

impl GroupField {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupField::EventName => "event_name",
            GroupField::EventCategory => "event_category",
            GroupField::Source => "source",
        }
    }
}

impl FromStr for GroupField {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "event_name" => Ok(GroupField::EventName),
            "event_category" => Ok(GroupField::EventCategory),
            "source" => Ok(GroupField::Source),
            other => Err(TallyError::Http(format!(
                "Invalid grouping field: {}",
                other
            ))),
        }
    }
}

/// Time-series bucket width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Day,
    Hour,
}

impl Interval {
    /// `$dateToString` format for this bucket width
    fn bucket_format(&self) -> &'static str {
        match self {
            Interval::Day => "%Y-%m-%d",
            Interval::Hour => "%Y-%m-%d %H",
        }
    }
}

impl FromStr for Interval {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "day" => Ok(Interval::Day),
            "hour" => Ok(Interval::Hour),
            other => Err(TallyError::Http(format!("Invalid interval: {}", other))),
        }
    }
}

/// One group-by bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCount {
    pub key: String,
    pub count: i64,
}

/// One time-series bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBucket {
    pub bucket: String,
    pub count: i64,
}

/// Result of a third-party metric fetch-and-store
#[derive(Debug, Clone, Serialize)]
pub struct TrackedMetric {
    pub metric_id: String,
    pub value: f64,
    pub source: String,
}

/// Business logic for analytics events and metrics
#[derive(Clone)]
pub struct AnalyticsService {
    events: MongoCollection<EventDoc>,
    metrics: MongoCollection<MetricDoc>,
    http: Arc<HttpClientManager>,
}

impl AnalyticsService {
    /// Open the event/metric collections (applies indexes)
    pub async fn new(mongo: &MongoClient, http: Arc<HttpClientManager>) -> Result<Self> {
        let events = mongo.collection::<EventDoc>(EVENT_COLLECTION).await?;
        let metrics = mongo.collection::<MetricDoc>(METRIC_COLLECTION).await?;
        Ok(Self {
            events,
            metrics,
            http,
        })
    }

    /// Insert an event
    pub async fn record_event(&self, event: EventDoc) -> Result<ObjectId> {
        self.events.insert_one(event).await
    }

    /// List events matching the query, newest first
    pub async fn list_events(&self, query: &EventQuery) -> Result<Vec<EventDoc>> {
        let filter = build_event_filter(query);
        let page = query.page.max(1);
        let skip = (page - 1) * query.limit.max(0) as u64;

        self.events
            .find_page(filter, doc! { "metadata.created_at": -1 }, skip, query.limit)
            .await
    }

    /// Fetch a single event by its hex ID. Malformed IDs read as "not found".
    pub async fn get_event(&self, event_id: &str) -> Result<Option<EventDoc>> {
        let oid = match ObjectId::parse_str(event_id) {
            Ok(oid) => oid,
            Err(_) => return Ok(None),
        };
        self.events.find_one(doc! { "_id": oid }).await
    }

    /// Count events created since the given instant
    pub async fn count_events_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let filter = doc! {
            "metadata.created_at": { "$gte": bson::DateTime::from_chrono(since) }
        };
        self.events.count(filter).await
    }

    /// Group events by a field, most frequent first
    pub async fn events_grouped_by(&self, field: GroupField) -> Result<Vec<GroupCount>> {
        let pipeline = vec![
            doc! {
                "$group": {
                    "_id": format!("${}", field.as_str()),
                    "count": { "$sum": 1 }
                }
            },
            doc! { "$sort": { "count": -1 } },
        ];

        let results = self.events.aggregate(pipeline).await?;
        Ok(results
            .iter()
            .map(|d| GroupCount {
                key: d
                    .get_str("_id")
                    .map(str::to_string)
                    .unwrap_or_else(|_| "unknown".to_string()),
                count: read_count(d),
            })
            .collect())
    }

    /// Bucket event counts over a time window
    pub async fn events_timeseries(
        &self,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeBucket>> {
        let pipeline = vec![
            doc! {
                "$match": {
                    "metadata.created_at": {
                        "$gte": bson::DateTime::from_chrono(start),
                        "$lte": bson::DateTime::from_chrono(end)
                    }
                }
            },
            doc! {
                "$group": {
                    "_id": {
                        "$dateToString": {
                            "format": interval.bucket_format(),
                            "date": "$metadata.created_at"
                        }
                    },
                    "count": { "$sum": 1 }
                }
            },
            doc! { "$sort": { "_id": 1 } },
        ];

        let results = self.events.aggregate(pipeline).await?;
        Ok(results
            .iter()
            .map(|d| TimeBucket {
                bucket: d.get_str("_id").unwrap_or_default().to_string(),
                count: read_count(d),
            })
            .collect())
    }

    /// Distinct users with at least one event since the given instant
    pub async fn active_users(&self, since: DateTime<Utc>) -> Result<u64> {
        let pipeline = vec![
            doc! {
                "$match": {
                    "metadata.created_at": { "$gte": bson::DateTime::from_chrono(since) }
                }
            },
            doc! { "$group": { "_id": "$user_id" } },
            doc! { "$count": "active_users" },
        ];

        let results = self.events.aggregate(pipeline).await?;
        Ok(results
            .first()
            .map(|d| read_field_count(d, "active_users") as u64)
            .unwrap_or(0))
    }

    /// Insert a custom metric
    pub async fn record_metric(&self, metric: MetricDoc) -> Result<ObjectId> {
        self.metrics.insert_one(metric).await
    }

    /// Fetch JSON from a third-party metric provider through the shared
    /// client. A 401 surfaces as an auth failure, any other error status as
    /// an upstream error; transport retries happen inside the client.
    pub async fn fetch_external_metric(
        &self,
        endpoint: &str,
        params: Vec<(String, String)>,
    ) -> Result<serde_json::Value> {
        let response = self
            .http
            .request(
                Method::GET,
                endpoint,
                RequestOptions {
                    query: params,
                    ..Default::default()
                },
            )
            .await?;

        let status = response.status();
        if status.as_u16() == 401 {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(endpoint, body = %body, "Invalid API key for metric provider");
            return Err(TallyError::Auth(
                "Third-party API authentication failed".into(),
            ));
        }
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(TallyError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let data = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| TallyError::Http(format!("Invalid JSON from {}: {}", endpoint, e)))?;

        info!(endpoint, "Fetched external metric");
        Ok(data)
    }

    /// Fetch a metric from a provider, extract a value, and store it.
    /// `extract_path` navigates nested JSON; a missing value stores 1.
    pub async fn track_third_party_metric(
        &self,
        name: &str,
        endpoint: &str,
        params: Vec<(String, String)>,
        extract_path: &[&str],
        unit: &str,
        source: &str,
    ) -> Result<TrackedMetric> {
        let data = self.fetch_external_metric(endpoint, params).await?;

        let value = extract_json_path(&data, extract_path)
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(1.0);

        let raw_response = match bson::to_bson(&data) {
            Ok(Bson::Document(d)) => Some(d),
            Ok(other) => Some(doc! { "value": other }),
            Err(_) => None,
        };

        let metric = MetricDoc {
            metric_name: name.to_string(),
            value,
            unit: unit.to_string(),
            source: source.to_string(),
            raw_response,
            ..Default::default()
        };

        let metric_id = self.metrics.insert_one(metric).await?;

        Ok(TrackedMetric {
            metric_id: metric_id.to_hex(),
            value,
            source: source.to_string(),
        })
    }
}

/// Build the Mongo filter for an event listing
pub fn build_event_filter(query: &EventQuery) -> Document {
    let mut filter = Document::new();

    if let Some(name) = &query.event_name {
        filter.insert("event_name", name.clone());
    }
    if let Some(user_id) = &query.user_id {
        filter.insert("user_id", user_id.clone());
    }
    if query.start_date.is_some() || query.end_date.is_some() {
        let mut range = Document::new();
        if let Some(start) = query.start_date {
            range.insert("$gte", bson::DateTime::from_chrono(start));
        }
        if let Some(end) = query.end_date {
            range.insert("$lte", bson::DateTime::from_chrono(end));
        }
        filter.insert("metadata.created_at", range);
    }

    filter
}

/// Navigate nested JSON by key path
pub fn extract_json_path<'a>(
    value: &'a serde_json::Value,
    path: &[&str],
) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

/// Read the "count" field of an aggregation result
fn read_count(d: &Document) -> i64 {
    read_field_count(d, "count")
}

fn read_field_count(d: &Document, field: &str) -> i64 {
    d.get_i64(field)
        .or_else(|_| d.get_i32(field).map(i64::from))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_event_filter_empty() {
        let filter = build_event_filter(&EventQuery::default());
        assert!(filter.is_empty());
    }

    #[test]
    fn test_build_event_filter_fields() {
        let query = EventQuery {
            event_name: Some("page_view".into()),
            user_id: Some("u1".into()),
            ..Default::default()
        };
        let filter = build_event_filter(&query);

        assert_eq!(filter.get_str("event_name").unwrap(), "page_view");
        assert_eq!(filter.get_str("user_id").unwrap(), "u1");
        assert!(filter.get("metadata.created_at").is_none());
    }

    #[test]
    fn test_build_event_filter_date_range() {
        let start = Utc::now() - chrono::Duration::days(7);
        let end = Utc::now();
        let query = EventQuery {
            start_date: Some(start),
            end_date: Some(end),
            ..Default::default()
        };
        let filter = build_event_filter(&query);

        let range = filter.get_document("metadata.created_at").unwrap();
        assert!(range.contains_key("$gte"));
        assert!(range.contains_key("$lte"));
    }

    #[test]
    fn test_build_event_filter_open_ended_range() {
        let query = EventQuery {
            start_date: Some(Utc::now()),
            ..Default::default()
        };
        let filter = build_event_filter(&query);
        let range = filter.get_document("metadata.created_at").unwrap();
        assert!(range.contains_key("$gte"));
        assert!(!range.contains_key("$lte"));
    }

    #[test]
    fn test_extract_json_path() {
        let data = json!({ "main": { "temp": 21.5 }, "name": "Oslo" });

        assert_eq!(
            extract_json_path(&data, &["main", "temp"]).and_then(|v| v.as_f64()),
            Some(21.5)
        );
        assert_eq!(
            extract_json_path(&data, &["name"]).and_then(|v| v.as_str()),
            Some("Oslo")
        );
        assert!(extract_json_path(&data, &["main", "missing"]).is_none());
        assert!(extract_json_path(&data, &["main", "temp", "deeper"]).is_none());
    }

    #[test]
    fn test_group_field_from_str() {
        assert_eq!(
            "event_name".parse::<GroupField>().unwrap(),
            GroupField::EventName
        );
        assert_eq!("source".parse::<GroupField>().unwrap(), GroupField::Source);
        assert!("password_hash".parse::<GroupField>().is_err());
    }

    #[test]
    fn test_interval_formats() {
        assert_eq!(Interval::Day.bucket_format(), "%Y-%m-%d");
        assert_eq!(Interval::Hour.bucket_format(), "%Y-%m-%d %H");
        assert!("week".parse::<Interval>().is_err());
    }

    #[test]
    fn test_read_count_handles_i32_and_i64() {
        let d32 = doc! { "count": 5_i32 };
        let d64 = doc! { "count": 5_i64 };
        assert_eq!(read_count(&d32), 5);
        assert_eq!(read_count(&d64), 5);
    }
}
