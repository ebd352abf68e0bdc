//! REST store implementation (PostgREST dialect)
//!
//! Rows live in four tables exposed under `/rest/v1/<table>`. Filters are
//! encoded as query parameters (`field=eq.value`, `field=in.(a,b)`), ordering
//! as `order=field.desc` and limits as `limit=n`.

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Compare-and-set rounds before a sequence allocation gives up
const SEQUENCE_ATTEMPTS: usize = 5;

/// PostgREST-backed store
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    /// Create a client for the REST store at `url`
    pub fn new(url: &str, service_key: &str, timeout_secs: u64) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }

    fn table(collection: Collection) -> &'static str {
        match collection {
            Collection::Workflows => "ca_workflows",
            Collection::Runs => "ca_workflow_runs",
            Collection::QueuedWorkflows => "ca_queued_workflows",
            Collection::Config => "ca_config",
        }
    }

    fn request(&self, method: Method, collection: Collection) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, Self::table(collection));
        self.client
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// Render a scalar the way PostgREST expects it inside a filter
    fn literal(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
        filters
            .iter()
            .map(|filter| match filter {
                Filter::Eq(field, Value::Null) => (field.clone(), "is.null".to_string()),
                Filter::Eq(field, value) => (field.clone(), format!("eq.{}", Self::literal(value))),
                Filter::In(field, values) => {
                    let items: Vec<String> = values
                        .iter()
                        .map(|v| match v {
                            Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
                            other => other.to_string(),
                        })
                        .collect();
                    (field.clone(), format!("in.({})", items.join(",")))
                }
            })
            .collect()
    }

    fn query_params(query: &Query) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(Self::filter_params(&query.filters));
        if let Some(order) = &query.order {
            let direction = match order.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            params.push(("order".to_string(), format!("{}.{}", order.field, direction)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, StorageError> {
        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn rows(response: reqwest::Response) -> StorageResult<Vec<Row>> {
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidData(format!("json deserialize error: {}", e)))?;

        match value {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(row) => Some(row),
                    _ => None,
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl StoreClient for RestStore {
    fn backend(&self) -> &'static str {
        "rest"
    }

    async fn select(&self, collection: Collection, query: &Query) -> StorageResult<Vec<Row>> {
        let request = self
            .request(Method::GET, collection)
            .query(&Self::query_params(query));
        let response = self.send(request).await?;
        Self::rows(response).await
    }

    async fn insert(&self, collection: Collection, row: Row) -> StorageResult<()> {
        let request = self
            .request(Method::POST, collection)
            .header("Prefer", "return=minimal")
            .json(&row);
        self.send(request).await?;
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> StorageResult<u64> {
        let request = self
            .request(Method::PATCH, collection)
            .header("Prefer", "return=representation")
            .query(&Self::filter_params(filters))
            .json(&patch);
        let response = self.send(request).await?;
        Ok(Self::rows(response).await?.len() as u64)
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> StorageResult<u64> {
        let request = self
            .request(Method::DELETE, collection)
            .header("Prefer", "return=representation")
            .query(&Self::filter_params(filters));
        let response = self.send(request).await?;
        Ok(Self::rows(response).await?.len() as u64)
    }

    /// Allocate from a high-water mark kept in `ca_config` under `seq:<table>.<field>`.
    ///
    /// The mark only moves forward, so values survive deletion of the rows that
    /// used them. Advancing it is a compare-and-set PATCH on the old value.
    async fn next_sequence(&self, collection: Collection, field: &str) -> StorageResult<i64> {
        let key = format!("seq:{}.{}", Self::table(collection), field);
        let mark_filter = Filter::eq("key", key.clone());

        for _ in 0..SEQUENCE_ATTEMPTS {
            let mark = self
                .select(Collection::Config, &Query::new().filter(mark_filter.clone()).limit(1))
                .await?
                .into_iter()
                .next()
                .and_then(|row| row.get("value").and_then(Value::as_i64));

            let Some(current) = mark else {
                // first allocation: seed from whatever rows already exist
                let query = Query::new().order_by(field, Direction::Desc).limit(1);
                let highest = self
                    .select(collection, &query)
                    .await?
                    .first()
                    .and_then(|row| row.get(field))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                let next = highest + 1;

                let mut row = Row::new();
                row.insert("key".to_string(), Value::String(key.clone()));
                row.insert("value".to_string(), Value::from(next));
                self.insert(Collection::Config, row).await?;
                return Ok(next);
            };

            let next = current + 1;
            let mut patch = Row::new();
            patch.insert("value".to_string(), Value::from(next));
            let changed = self
                .update(
                    Collection::Config,
                    &[mark_filter.clone(), Filter::eq("value", current)],
                    patch,
                )
                .await?;
            if changed > 0 {
                return Ok(next);
            }
            tracing::debug!(key = %key, current, "Sequence advanced concurrently, retrying");
        }

        Err(StorageError::Query(format!(
            "could not advance sequence {} after {} attempts",
            key, SEQUENCE_ATTEMPTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Records;
    use conductor_types::QueueEntry;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    #[tokio::test]
    async fn test_select_encodes_filters_and_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/ca_workflow_runs"))
            .and(query_param("select", "*"))
            .and(query_param("workflow_id", "eq.wf-1"))
            .and(query_param("order", "run_number.desc"))
            .and(query_param("limit", "1"))
            .and(header("apikey", "sk-test"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"workflow_id": "wf-1", "run_number": 3}])),
            )
            .mount(&server)
            .await;

        let store = RestStore::new(&server.uri(), "sk-test", 5).unwrap();
        let query = Query::new()
            .filter(Filter::eq("workflow_id", "wf-1"))
            .order_by("run_number", Direction::Desc)
            .limit(1);
        let rows = store.select(Collection::Runs, &query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["run_number"], 3);
    }

    #[tokio::test]
    async fn test_membership_filter() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/ca_workflows"))
            .and(query_param("workflow_id", "in.(\"a\",\"b\")"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = RestStore::new(&server.uri(), "sk-test", 5).unwrap();
        let query = Query::new().filter(Filter::is_in("workflow_id", ["a", "b"]));
        let rows = store.select(Collection::Workflows, &query).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_insert_posts_row() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/ca_queued_workflows"))
            .and(body_json(json!({"app_name": "github", "position": 1})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = RestStore::new(&server.uri(), "sk-test", 5).unwrap();
        let row = json!({"app_name": "github", "position": 1})
            .as_object()
            .cloned()
            .unwrap();
        store.insert(Collection::QueuedWorkflows, row).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_counts_returned_rows() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/rest/v1/ca_config"))
            .and(query_param("key", "eq.max_concurrent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"key": "max_concurrent", "value": 12}])),
            )
            .mount(&server)
            .await;

        let store = RestStore::new(&server.uri(), "sk-test", 5).unwrap();
        let patch = json!({"value": 12}).as_object().cloned().unwrap();
        let changed = store
            .update(Collection::Config, &[Filter::eq("key", "max_concurrent")], patch)
            .await
            .unwrap();
        assert_eq!(changed, 1);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/ca_config"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let store = RestStore::new(&server.uri(), "sk-test", 5).unwrap();
        let err = store
            .select(Collection::Config, &Query::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Http { status: 503, ref body } if body == "unavailable"));
    }

    /// In-memory PostgREST: eq/in/is filters, order, limit and representation returns
    #[derive(Clone, Default)]
    struct FakePostgrest {
        tables: Arc<Mutex<HashMap<String, Vec<Row>>>>,
    }

    impl FakePostgrest {
        async fn mount(&self, server: &MockServer) {
            Mock::given(path_regex(r"^/rest/v1/[a-z_]+$"))
                .respond_with(self.clone())
                .mount(server)
                .await;
        }

        fn seed(&self, table: &str, row: Value) {
            let row = row.as_object().cloned().unwrap();
            self.tables
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default()
                .push(row);
        }

        fn rows(&self, table: &str) -> Vec<Row> {
            self.tables
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default()
        }
    }

    fn matches_param(row: &Row, field: &str, expr: &str) -> bool {
        let actual = row.get(field).unwrap_or(&Value::Null);
        if expr == "is.null" {
            return actual.is_null();
        }
        if let Some(expected) = expr.strip_prefix("eq.") {
            return !actual.is_null() && RestStore::literal(actual) == expected;
        }
        if let Some(list) = expr.strip_prefix("in.(").and_then(|l| l.strip_suffix(')')) {
            let actual = RestStore::literal(actual);
            return list.split(',').any(|item| item.trim_matches('"') == actual);
        }
        false
    }

    impl Respond for FakePostgrest {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let table = request.url.path().trim_start_matches("/rest/v1/").to_string();
            let params: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
            let filters: Vec<&(String, String)> = params
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "select" | "order" | "limit"))
                .collect();
            let selected = |row: &Row| filters.iter().all(|(f, e)| matches_param(row, f, e));

            let mut tables = self.tables.lock().unwrap();
            let rows = tables.entry(table).or_default();
            match request.method.as_str() {
                "GET" => {
                    let mut out: Vec<Row> = rows.iter().filter(|r| selected(r)).cloned().collect();
                    if let Some((_, order)) = params.iter().find(|(k, _)| k == "order") {
                        let (field, direction) = order.rsplit_once('.').unwrap();
                        out.sort_by(|a, b| {
                            compare_values(
                                a.get(field).unwrap_or(&Value::Null),
                                b.get(field).unwrap_or(&Value::Null),
                            )
                        });
                        if direction == "desc" {
                            out.reverse();
                        }
                    }
                    if let Some((_, limit)) = params.iter().find(|(k, _)| k == "limit") {
                        out.truncate(limit.parse().unwrap());
                    }
                    ResponseTemplate::new(200).set_body_json(out)
                }
                "POST" => {
                    let row: Row = serde_json::from_slice(&request.body).unwrap();
                    rows.push(row);
                    ResponseTemplate::new(201)
                }
                "PATCH" => {
                    let patch: Row = serde_json::from_slice(&request.body).unwrap();
                    let mut out = Vec::new();
                    for row in rows.iter_mut().filter(|r| selected(&**r)) {
                        row.extend(patch.clone());
                        out.push(row.clone());
                    }
                    ResponseTemplate::new(200).set_body_json(out)
                }
                "DELETE" => {
                    let (removed, kept): (Vec<Row>, Vec<Row>) =
                        rows.drain(..).partition(|r| selected(r));
                    *rows = kept;
                    ResponseTemplate::new(200).set_body_json(removed)
                }
                _ => ResponseTemplate::new(405),
            }
        }
    }

    #[tokio::test]
    async fn test_next_sequence_seeds_from_existing_rows() {
        let server = MockServer::start().await;
        let postgrest = FakePostgrest::default();
        postgrest.seed("ca_queued_workflows", json!({"app_name": "github", "position": 4}));
        postgrest.mount(&server).await;

        let store = RestStore::new(&server.uri(), "sk-test", 5).unwrap();
        let next = store
            .next_sequence(Collection::QueuedWorkflows, "position")
            .await
            .unwrap();
        assert_eq!(next, 5);

        let marks = postgrest.rows("ca_config");
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0]["key"], "seq:ca_queued_workflows.position");
        assert_eq!(marks[0]["value"], 5);
    }

    #[tokio::test]
    async fn test_queue_positions_not_reused_after_claim() {
        let server = MockServer::start().await;
        let postgrest = FakePostgrest::default();
        postgrest.mount(&server).await;

        let store = RestStore::new(&server.uri(), "sk-test", 5).unwrap();
        let records = Records::new(Arc::new(store));

        let mut positions = Vec::new();
        for app in ["slack", "github", "notion"] {
            let position = records.next_queue_position().await.unwrap();
            let entry = QueueEntry::new(app, None, json!({"app_name": app}), position);
            records.enqueue(&entry).await.unwrap();
            positions.push(position);
        }
        assert_eq!(positions, vec![1, 2, 3]);

        // the tail entry goes away, its position must not come back
        assert!(records.claim_queued(3).await.unwrap());
        assert_eq!(postgrest.rows("ca_queued_workflows").len(), 2);
        assert_eq!(records.next_queue_position().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_next_sequence_gives_up_when_mark_keeps_moving() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/ca_config"))
            .and(query_param("key", "eq.seq:ca_queued_workflows.position"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"key": "seq:ca_queued_workflows.position", "value": 7}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/ca_config"))
            .and(query_param("value", "eq.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(SEQUENCE_ATTEMPTS as u64)
            .mount(&server)
            .await;

        let store = RestStore::new(&server.uri(), "sk-test", 5).unwrap();
        let err = store
            .next_sequence(Collection::QueuedWorkflows, "position")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Query(_)));
    }
}
