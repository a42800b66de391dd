//! Elasticsearch adapter.
//!
//! Talks to the REST API with a blocking `reqwest` client. Query bodies and
//! response parsing are plain functions so they can be checked without a
//! running cluster.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::DocumentConfig;
use crate::error::{Error, Result};
use crate::model::{BoundingBox, Entity, GeoPoint, Sample, SampleRecord, TimeRange};
use crate::query::{QueryResult, RESULT_CAP};

use super::{StoreAdapter, ENTITY_MAP, SAMPLES};

const STORE: &str = "elasticsearch";

/// Timeout for establishing a TCP connection. Requests themselves never time out.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Elasticsearch store adapter.
pub struct ElasticsearchAdapter {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct EntityDocument<'a> {
    external_id: &'a str,
    entity_id: &'a str,
}

#[derive(Serialize, Deserialize)]
struct SampleDocument {
    entity_id: String,
    timestamp: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    location: GeoPoint,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    total: TotalHits,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: SampleDocument,
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

impl ElasticsearchAdapter {
    /// Create the adapter. No request is sent until the first call.
    pub fn new(config: &DocumentConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(map_reqwest_error)?;

        let base_url = config.base_url();
        debug!(url = %base_url, "elasticsearch client created");
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        request.send().map_err(map_reqwest_error)
    }

    /// Send and read the body, failing on any non-2xx status.
    fn send_ok(&self, request: RequestBuilder) -> Result<String> {
        let response = self.send(request)?;
        let status = response.status();
        let body = response.text().map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(status_error(status, format!("HTTP {}: {}", status, body)));
        }
        Ok(body)
    }

    fn recreate_index(&self, index: &str, mapping: Value) -> Result<()> {
        let response = self.send(self.client.delete(self.url(index)))?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            let body = response.text().unwrap_or_default();
            return Err(status_error(
                status,
                format!("deleting index {} failed with HTTP {}: {}", index, status, body),
            ));
        }

        self.send_ok(self.client.put(self.url(index)).json(&mapping))?;
        debug!(index, "index created");
        Ok(())
    }

    fn bulk(&self, body: String, records: usize) -> Result<usize> {
        let request = self
            .client
            .post(self.url("_bulk"))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);

        let response = match self.send_ok(request) {
            Ok(response) => response,
            Err(Error::Query { message, .. }) => {
                return Err(Error::PartialWrite {
                    store: STORE,
                    written: 0,
                    failed: records,
                    reason: message,
                })
            }
            Err(other) => return Err(other),
        };

        let failed = count_bulk_failures(&response)?;
        if failed > 0 {
            return Err(Error::PartialWrite {
                store: STORE,
                written: records.saturating_sub(failed),
                failed,
                reason: format!("{} of {} bulk item(s) rejected", failed, records),
            });
        }
        Ok(records)
    }

    fn search(&self, body: Value) -> Result<QueryResult> {
        let response = self.send_ok(
            self.client
                .post(self.url(&format!("{}/_search", SAMPLES)))
                .json(&body),
        )?;
        parse_search_response(&response)
    }
}

impl StoreAdapter for ElasticsearchAdapter {
    fn name(&self) -> &'static str {
        STORE
    }

    fn ping(&mut self) -> Result<()> {
        self.send_ok(self.client.get(&self.base_url))?;
        Ok(())
    }

    fn reset_schema(&mut self) -> Result<()> {
        self.recreate_index(ENTITY_MAP, entity_map_mapping())?;
        self.recreate_index(SAMPLES, samples_mapping())
    }

    fn insert_entities(&mut self, entities: &[Entity]) -> Result<usize> {
        if entities.is_empty() {
            return Ok(0);
        }
        let body = bulk_body(
            ENTITY_MAP,
            entities.iter().map(|e| EntityDocument {
                external_id: &e.external_id,
                entity_id: &e.entity_id,
            }),
        )?;
        self.bulk(body, entities.len())
    }

    fn insert_samples(&mut self, entity_id: &str, samples: &[Sample]) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }
        let body = bulk_body(
            SAMPLES,
            samples.iter().map(|s| SampleDocument {
                entity_id: entity_id.to_string(),
                timestamp: s.timestamp,
                latitude: s.latitude,
                longitude: s.longitude,
                location: GeoPoint::new(s.latitude, s.longitude),
            }),
        )?;
        self.bulk(body, samples.len())
    }

    fn flush(&mut self) -> Result<()> {
        for index in [ENTITY_MAP, SAMPLES] {
            self.send_ok(self.client.post(self.url(&format!("{}/_refresh", index))))?;
        }
        Ok(())
    }

    fn sample_count(&mut self) -> Result<u64> {
        let response = self.send(self.client.get(self.url(&format!("{}/_count", SAMPLES))))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let body = response.text().map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(status_error(status, format!("HTTP {}: {}", status, body)));
        }
        let count: CountResponse = serde_json::from_str(&body)?;
        Ok(count.count)
    }

    fn query_by_entity_time_range(
        &mut self,
        entity_id: &str,
        range: &TimeRange,
    ) -> Result<QueryResult> {
        self.search(entity_time_range_body(entity_id, range))
    }

    fn query_by_bounding_box(&mut self, bbox: &BoundingBox) -> Result<QueryResult> {
        self.search(bounding_box_body(bbox))
    }

    fn query_by_entity_set_time_range(
        &mut self,
        entity_ids: &[String],
        range: &TimeRange,
    ) -> Result<QueryResult> {
        self.search(entity_set_time_range_body(entity_ids, range))
    }
}

fn entity_map_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "external_id": { "type": "keyword" },
                "entity_id": { "type": "keyword" }
            }
        }
    })
}

fn samples_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "entity_id": { "type": "keyword" },
                "timestamp": { "type": "date" },
                "location": { "type": "geo_point" },
                "longitude": { "type": "float" },
                "latitude": { "type": "float" }
            }
        }
    })
}

fn timestamp_range(range: &TimeRange) -> Value {
    json!({
        "range": {
            "timestamp": {
                "gte": range.start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                "lte": range.end.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            }
        }
    })
}

/// Wrap a query clause with the page cap and exact hit counting.
fn search_body(query: Value) -> Value {
    json!({
        "query": query,
        "size": RESULT_CAP,
        "track_total_hits": true
    })
}

fn entity_time_range_body(entity_id: &str, range: &TimeRange) -> Value {
    search_body(json!({
        "bool": {
            "must": [
                { "term": { "entity_id": entity_id } },
                timestamp_range(range)
            ]
        }
    }))
}

fn bounding_box_body(bbox: &BoundingBox) -> Value {
    search_body(json!({
        "geo_bounding_box": {
            "location": {
                "top_left": { "lat": bbox.max_lat, "lon": bbox.min_lon },
                "bottom_right": { "lat": bbox.min_lat, "lon": bbox.max_lon }
            }
        }
    }))
}

fn entity_set_time_range_body(entity_ids: &[String], range: &TimeRange) -> Value {
    search_body(json!({
        "bool": {
            "must": [
                { "terms": { "entity_id": entity_ids } },
                timestamp_range(range)
            ]
        }
    }))
}

/// Encode documents as a `_bulk` NDJSON body.
fn bulk_body<T: Serialize>(index: &str, docs: impl Iterator<Item = T>) -> Result<String> {
    let action = serde_json::to_string(&json!({ "index": { "_index": index } }))?;
    let mut body = String::new();
    for doc in docs {
        body.push_str(&action);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc)?);
        body.push('\n');
    }
    Ok(body)
}

/// Number of items a `_bulk` response reports as failed.
fn count_bulk_failures(body: &str) -> Result<usize> {
    let response: BulkResponse = serde_json::from_str(body)?;
    if !response.errors {
        return Ok(0);
    }

    Ok(response
        .items
        .iter()
        .filter_map(|item| item.as_object().and_then(|ops| ops.values().next()))
        .filter(|op| op.get("error").is_some())
        .count())
}

fn parse_search_response(body: &str) -> Result<QueryResult> {
    let response: SearchResponse = serde_json::from_str(body)?;
    let records = response
        .hits
        .hits
        .into_iter()
        .map(|hit| SampleRecord {
            entity_id: hit.source.entity_id,
            timestamp: hit.source.timestamp,
            latitude: hit.source.latitude,
            longitude: hit.source.longitude,
        })
        .collect();

    Ok(QueryResult::new(records, response.hits.total.value))
}

/// A non-2xx answer. 503 means the cluster is up but not serving yet.
fn status_error(status: StatusCode, message: String) -> Error {
    if status == StatusCode::SERVICE_UNAVAILABLE {
        Error::Connection {
            store: STORE,
            message,
        }
    } else {
        Error::Query {
            store: STORE,
            message,
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_connect() || err.is_timeout() {
        Error::Connection {
            store: STORE,
            message: err.to_string(),
        }
    } else {
        Error::Query {
            store: STORE,
            message: err.to_string(),
        }
    }
}
