//! Cloud Firestore adapter
//!
//! Talks to the Firestore REST API (v1). Collections live under
//! `projects/<project>/databases/(default)/documents[/<root_path>]`.
//!
//! The REST API has no push channel, so [`RemoteStore::subscribe`] polls for
//! documents updated since the last poll. Polling cannot see deletions; the
//! feed only ever reports added and modified documents.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::value::{decode_fields, encode_fields};
use super::{
    next_cursor, Change, ChangeBatch, ChangeKind, ChangeStream, Page, PageCursor, RemoteDoc,
    RemoteError, RemoteResult, RemoteStore,
};
use crate::config::RemoteConfig;
use crate::timestamp;

/// Page size used when polling the change feed
const POLL_PAGE: usize = 100;

/// Remote store backed by Cloud Firestore
#[derive(Clone)]
pub struct FirestoreRemote {
    client: reqwest::Client,
    settings: Arc<Settings>,
}

struct Settings {
    base_url: String,
    /// Resource name of the document root, e.g. `projects/p/databases/(default)/documents`
    root: String,
    api_key: Option<String>,
    auth_token: Option<String>,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    create_time: Option<String>,
    update_time: Option<String>,
}

impl WireDocument {
    fn is_new(&self) -> bool {
        self.create_time.is_some() && self.create_time == self.update_time
    }

    fn into_doc(self) -> RemoteDoc {
        let id = self.name.rsplit('/').next().unwrap_or_default().to_string();
        RemoteDoc::new(id, decode_fields(&self.fields))
    }
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    document: Option<WireDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregationRow {
    result: Option<AggregationResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregationResult {
    #[serde(default)]
    aggregate_fields: Map<String, Value>,
}

impl FirestoreRemote {
    /// Build a client from the `[remote]` configuration section
    pub fn from_config(config: &RemoteConfig) -> RemoteResult<Self> {
        let project = config
            .project_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(RemoteError::NotConfigured("project_id"))?;

        let mut root = format!("projects/{project}/databases/(default)/documents");
        if let Some(path) = config
            .root_path
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
        {
            root.push('/');
            root.push_str(path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("verse/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            settings: Arc::new(Settings {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                root,
                api_key: config.api_key.clone(),
                auth_token: config.auth_token.clone(),
                poll_interval: config.poll_interval(),
            }),
        })
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.settings.root, collection, id)
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.settings.base_url, resource)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let mut request = self.client.request(method, url);
        if let Some(key) = &self.settings.api_key {
            request = request.query(&[("key", key)]);
        }
        if let Some(token) = &self.settings.auth_token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn patch(&self, collection: &str, doc: &RemoteDoc, mask: bool) -> RemoteResult<()> {
        let url = self.url(&self.document_name(collection, &doc.id));
        let mut request = self.request(Method::PATCH, url);
        if mask {
            let paths: Vec<(&str, &str)> = doc
                .fields
                .keys()
                .map(|name| ("updateMask.fieldPaths", name.as_str()))
                .collect();
            request = request.query(&paths);
        }
        let body = json!({ "fields": encode_fields(&doc.fields) });
        self.send(request.json(&body)).await?;
        debug!(collection, id = %doc.id, merge = mask, "document written");
        Ok(())
    }

    async fn run_query(
        &self,
        collection: &str,
        after: Option<DateTime<Utc>>,
        start: Option<&PageCursor>,
        limit: usize,
    ) -> RemoteResult<Vec<WireDocument>> {
        let mut query = base_query(collection, after);
        query["orderBy"] = json!([
            { "field": { "fieldPath": "updatedAt" }, "direction": "ASCENDING" },
            { "field": { "fieldPath": "__name__" }, "direction": "ASCENDING" }
        ]);
        if let Some(cursor) = start {
            query["startAt"] = json!({
                "values": [
                    { "stringValue": timestamp::format(&cursor.updated_at) },
                    { "referenceValue": self.document_name(collection, &cursor.id) }
                ],
                "before": false
            });
        }
        query["limit"] = json!(limit);

        let url = self.url(&format!("{}:runQuery", self.settings.root));
        let body = json!({ "structuredQuery": query });
        let rows: Vec<QueryRow> = self
            .send(self.request(Method::POST, url).json(&body))
            .await?
            .json()
            .await?;
        Ok(rows.into_iter().filter_map(|row| row.document).collect())
    }
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_connect() || error.is_timeout() {
        RemoteError::Unreachable(error.to_string())
    } else {
        RemoteError::Http(error)
    }
}

fn base_query(collection: &str, after: Option<DateTime<Utc>>) -> Value {
    let mut query = json!({ "from": [{ "collectionId": collection }] });
    if let Some(after) = after {
        query["where"] = json!({
            "fieldFilter": {
                "field": { "fieldPath": "updatedAt" },
                "op": "GREATER_THAN",
                "value": { "stringValue": timestamp::format(&after) }
            }
        });
    }
    query
}

#[async_trait]
impl RemoteStore for FirestoreRemote {
    async fn get(&self, collection: &str, id: &str) -> RemoteResult<Option<RemoteDoc>> {
        let url = self.url(&self.document_name(collection, id));
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(RemoteError::Status {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let wire: WireDocument = response.json().await?;
        Ok(Some(wire.into_doc()))
    }

    async fn set(&self, collection: &str, doc: &RemoteDoc) -> RemoteResult<()> {
        self.patch(collection, doc, false).await
    }

    async fn merge(&self, collection: &str, doc: &RemoteDoc) -> RemoteResult<()> {
        self.patch(collection, doc, true).await
    }

    async fn delete(&self, collection: &str, id: &str) -> RemoteResult<()> {
        let url = self.url(&self.document_name(collection, id));
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn count_updated_after(
        &self,
        collection: &str,
        after: Option<DateTime<Utc>>,
    ) -> RemoteResult<u64> {
        let url = self.url(&format!("{}:runAggregationQuery", self.settings.root));
        let body = json!({
            "structuredAggregationQuery": {
                "structuredQuery": base_query(collection, after),
                "aggregations": [{ "alias": "total", "count": {} }]
            }
        });
        let rows: Vec<AggregationRow> = self
            .send(self.request(Method::POST, url).json(&body))
            .await?
            .json()
            .await?;

        let total = rows
            .into_iter()
            .find_map(|row| row.result)
            .and_then(|result| decode_fields(&result.aggregate_fields).remove("total"))
            .and_then(|value| value.as_u64())
            .unwrap_or(0);
        Ok(total)
    }

    async fn query_updated_after(
        &self,
        collection: &str,
        after: Option<DateTime<Utc>>,
        start: Option<&PageCursor>,
        limit: usize,
    ) -> RemoteResult<Page> {
        let docs: Vec<RemoteDoc> = self
            .run_query(collection, after, start, limit)
            .await?
            .into_iter()
            .map(WireDocument::into_doc)
            .collect();
        let next = next_cursor(&docs, limit);
        Ok(Page { docs, next })
    }

    async fn subscribe(&self, collection: &str) -> RemoteResult<ChangeStream> {
        let poller = Poller {
            remote: self.clone(),
            collection: collection.to_string(),
            since: timestamp::now(),
            started: false,
        };

        let feed = stream::unfold(poller, |mut poller| async move {
            if !poller.started {
                // the state at subscription time is covered by the sync run
                poller.started = true;
                return Some((Ok(ChangeBatch::new()), poller));
            }
            tokio::time::sleep(poller.remote.settings.poll_interval).await;
            let batch = poller.poll().await;
            if let Err(e) = &batch {
                warn!(collection = %poller.collection, error = %e, "change feed poll failed");
            }
            Some((batch, poller))
        });
        Ok(feed.boxed())
    }
}

struct Poller {
    remote: FirestoreRemote,
    collection: String,
    since: DateTime<Utc>,
    started: bool,
}

impl Poller {
    /// Collect every document updated since the previous poll
    async fn poll(&mut self) -> RemoteResult<ChangeBatch> {
        let mut batch = ChangeBatch::new();
        let mut cursor: Option<PageCursor> = None;
        loop {
            let rows = self
                .remote
                .run_query(&self.collection, Some(self.since), cursor.as_ref(), POLL_PAGE)
                .await?;
            let full = rows.len() == POLL_PAGE;
            for row in rows {
                let kind = if row.is_new() {
                    ChangeKind::Added
                } else {
                    ChangeKind::Modified
                };
                batch.push(Change {
                    kind,
                    doc: row.into_doc(),
                });
            }
            cursor = match batch.last() {
                Some(last) if full => last.doc.updated_at().map(|updated_at| PageCursor {
                    updated_at,
                    id: last.doc.id.clone(),
                }),
                _ => None,
            };
            if cursor.is_none() {
                break;
            }
        }

        if let Some(latest) = batch.iter().filter_map(|c| c.doc.updated_at()).max() {
            self.since = self.since.max(latest);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RemoteConfig {
        RemoteConfig {
            project_id: Some("journal".to_string()),
            root_path: Some("/users/u1/".to_string()),
            ..RemoteConfig::default()
        }
    }

    #[test]
    fn test_requires_project_id() {
        let err = FirestoreRemote::from_config(&RemoteConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, RemoteError::NotConfigured("project_id")));
    }

    #[test]
    fn test_document_names() {
        let remote = FirestoreRemote::from_config(&config()).unwrap();
        assert_eq!(
            remote.document_name("records", "abc"),
            "projects/journal/databases/(default)/documents/users/u1/records/abc"
        );
        assert_eq!(
            remote.url("x"),
            "https://firestore.googleapis.com/v1/x"
        );
    }

    #[test]
    fn test_base_query_filters_on_watermark() {
        let query = base_query("records_meta", None);
        assert!(query.get("where").is_none());

        let at = timestamp::parse("2024-03-01T10:00:00.000Z").unwrap();
        let query = base_query("records_meta", Some(at));
        assert_eq!(query["from"][0]["collectionId"], "records_meta");
        assert_eq!(query["where"]["fieldFilter"]["op"], "GREATER_THAN");
        assert_eq!(
            query["where"]["fieldFilter"]["value"]["stringValue"],
            "2024-03-01T10:00:00.000Z"
        );
    }

    #[test]
    fn test_wire_document_conversion() {
        let wire: WireDocument = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/records/abc",
            "fields": { "title": { "stringValue": "t" } },
            "createTime": "2024-01-01T00:00:00Z",
            "updateTime": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(wire.is_new());

        let doc = wire.into_doc();
        assert_eq!(doc.id, "abc");
        assert_eq!(doc.fields["title"], "t");
    }
}
