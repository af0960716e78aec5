//! Firestore over its REST v1 API. Documents are JSON objects converted to Firestore's
//! typed values; RFC 3339 strings are stored as `timestampValue` so they sort and filter as
//! instants.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat};
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{DocumentStore, StoreError, check_collection_path, check_document_path};

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

const PAGE_SIZE: u32 = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionIdsPage {
    #[serde(default)]
    collection_ids: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentsPage {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct FirestoreStore {
    client: Client,
    root: String,
    token: String,
}

impl FirestoreStore {
    pub fn new(base_url: &str, project_id: &str, token: &str) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            root: format!(
                "{}/projects/{}/databases/(default)/documents",
                base_url.trim_end_matches('/'),
                project_id
            ),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &[&str]) -> String {
        format!("{}/{}", self.root, path.join("/"))
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl DocumentStore for FirestoreStore {
    fn upsert(&mut self, path: &[&str], document: &Value) -> Result<(), StoreError> {
        check_document_path(path)?;
        let fields = encode_fields(document)?;
        log::debug!("PATCH {}", path.join("/"));
        self.send(
            self.client
                .patch(self.url(path))
                .json(&json!({ "fields": fields })),
        )?;
        Ok(())
    }

    fn collection_ids(&self, path: &[&str]) -> Result<Vec<String>, StoreError> {
        check_document_path(path)?;
        let url = format!("{}:listCollectionIds", self.url(path));
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut body = json!({ "pageSize": PAGE_SIZE });
            if let Some(token) = &page_token {
                body["pageToken"] = json!(token);
            }
            let page: CollectionIdsPage = self.send(self.client.post(&url).json(&body))?.json()?;
            ids.extend(page.collection_ids);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn documents(&self, path: &[&str]) -> Result<Vec<(String, Value)>, StoreError> {
        check_collection_path(path)?;
        let base = Url::parse(&self.url(path))
            .map_err(|e| StoreError::InvalidPath(format!("{}: {}", path.join("/"), e)))?;
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = base.clone();
            url.query_pairs_mut()
                .append_pair("pageSize", &PAGE_SIZE.to_string());
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }
            let page: DocumentsPage = self.send(self.client.get(url))?.json()?;
            documents.extend(decode_documents(page.documents));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(documents)
    }
}

/// Decodes a page of documents into `(id, document)` pairs. A document with a field the
/// decoder does not support is logged and left out.
fn decode_documents(raw: Vec<RawDocument>) -> Vec<(String, Value)> {
    raw.into_iter()
        .filter_map(|doc| {
            let id = doc.name.rsplit('/').next().unwrap_or_default().to_string();
            match decode_fields(&doc.fields) {
                Ok(document) => Some((id, document)),
                Err(e) => {
                    log::warn!("Skipping document {}: {}", doc.name, e);
                    None
                }
            }
        })
        .collect()
}

/// Converts a JSON object into a Firestore `fields` map.
pub fn encode_fields(document: &Value) -> Result<Map<String, Value>, StoreError> {
    let object = document
        .as_object()
        .ok_or_else(|| StoreError::Decode(format!("expected an object, got {}", document)))?;
    Ok(object
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect())
}

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "integerValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n }),
        Value::String(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => json!({
                "timestampValue": dt.to_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true)
            }),
            Err(_) => json!({ "stringValue": s }),
        },
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(object) => {
            let fields: Map<String, Value> = object
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

/// Converts a Firestore `fields` map back into a JSON object.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Value, StoreError> {
    let mut object = Map::new();
    for (k, v) in fields {
        object.insert(k.clone(), decode_value(v)?);
    }
    Ok(Value::Object(object))
}

pub fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Err(StoreError::Decode(format!("untyped value {}", value)));
    };
    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" | "stringValue" | "timestampValue" | "doubleValue" => Ok(inner.clone()),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .ok_or_else(|| StoreError::Decode(format!("bad integer {}", inner))),
        "arrayValue" => {
            let items = inner
                .get("values")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            Ok(Value::Array(
                items.iter().map(decode_value).collect::<Result<_, _>>()?,
            ))
        }
        "mapValue" => match inner.get("fields").and_then(Value::as_object) {
            Some(fields) => decode_fields(fields),
            None => Ok(Value::Object(Map::new())),
        },
        other => Err(StoreError::Decode(format!("unsupported value type {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionRecord;
    use chrono::NaiveDate;
    use chrono_tz::America::New_York;

    fn record() -> SessionRecord {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(19, 0, 0)
            .unwrap()
            .and_local_timezone(New_York)
            .unwrap();
        SessionRecord::new(
            New_York,
            start,
            start + chrono::TimeDelta::minutes(90),
            "Hip Hop: Intro",
            "https://studio.test/",
        )
        .unwrap()
        .with_instructor(Some("Ana".to_string()))
        .with_level(Some("Open".to_string()))
    }

    #[test]
    fn test_encode_record_fields() {
        let fields = encode_fields(&serde_json::to_value(record()).unwrap()).unwrap();

        assert_eq!(
            fields["start_time"],
            json!({ "timestampValue": "2024-06-01T23:00:00Z" })
        );
        assert_eq!(
            fields["session_name"],
            json!({ "stringValue": "Hip Hop: Intro" })
        );
        assert_eq!(fields["level"], json!({ "stringValue": "Open" }));
        assert!(!fields.contains_key("location"));
    }

    #[test]
    fn test_decoded_record_keeps_instants() {
        let fields = encode_fields(&serde_json::to_value(record()).unwrap()).unwrap();
        let decoded: SessionRecord =
            serde_json::from_value(decode_fields(&fields).unwrap()).unwrap();

        assert_eq!(decoded, record());
        assert_eq!(decoded.start_time.to_rfc3339(), "2024-06-01T23:00:00+00:00");
    }

    #[test]
    fn test_decode_nested_values() {
        let value = json!({
            "mapValue": { "fields": {
                "n": { "integerValue": "3" },
                "tags": { "arrayValue": {
                    "values": [{ "stringValue": "a" }, { "nullValue": null }]
                } },
                "empty": { "arrayValue": {} }
            }}
        });
        assert_eq!(
            decode_value(&value).unwrap(),
            json!({ "n": 3, "tags": ["a", null], "empty": [] })
        );
        assert!(decode_value(&json!({ "geoPointValue": {} })).is_err());
    }

    #[test]
    fn test_unsupported_document_is_skipped() {
        let page: DocumentsPage = serde_json::from_value(json!({
            "documents": [
                {
                    "name": "documents/classes/Peri/2024-06-01/2024-06-01Jazz",
                    "fields": { "session_name": { "stringValue": "Jazz" } }
                },
                {
                    "name": "documents/classes/Peri/2024-06-01/pinned",
                    "fields": {
                        "where": { "geoPointValue": { "latitude": 40.7, "longitude": -74.0 } }
                    }
                },
                {
                    "name": "documents/classes/Peri/2024-06-01/2024-06-01Tap",
                    "fields": { "session_name": { "stringValue": "Tap" } }
                }
            ]
        }))
        .unwrap();

        let documents = decode_documents(page.documents);
        assert_eq!(
            documents,
            [
                ("2024-06-01Jazz".to_string(), json!({ "session_name": "Jazz" })),
                ("2024-06-01Tap".to_string(), json!({ "session_name": "Tap" })),
            ]
        );
        assert_eq!(page.next_page_token, None);
    }

    #[test]
    fn test_document_url() {
        let store = FirestoreStore::new(DEFAULT_BASE_URL, "atlas-dev", "token").unwrap();
        assert_eq!(
            store.url(&["classes", "Peri", "2024-06-01"]),
            "https://firestore.googleapis.com/v1/projects/atlas-dev/databases/(default)/documents/classes/Peri/2024-06-01"
        );
    }
}
