//! Firestore REST client implementing [`DocumentStore`]
//!
//! Documents live under
//! `projects/<project>/databases/(default)/documents/tenants/<tenant>/<collection>/<id>`.
//! Field values arrive in Firestore's typed encoding (`{"stringValue": ".."}`)
//! and are flattened to plain JSON.

use crate::error::{Error, Result};
use crate::prune::{DocumentStore, RemoteDocument};
use reqwest::blocking::{Client, Response};
use reqwest::{header, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

const PRODUCTION_HOST: &str = "https://firestore.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: u32 = 300;

pub const ACCESS_TOKEN_ENV: &str = "FIRESTORE_ACCESS_TOKEN";
pub const EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";
pub const PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";

/// Connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub access_token: Option<String>,
    /// `host:port` of a local emulator; plain HTTP is used when set
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    /// Settings for `project_id` with the token and emulator host taken from the environment
    pub fn from_env(project_id: impl Into<String>) -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            project_id: project_id.into(),
            access_token: non_empty(ACCESS_TOKEN_ENV),
            emulator_host: non_empty(EMULATOR_HOST_ENV),
        }
    }

    fn base_url(&self) -> String {
        match &self.emulator_host {
            Some(host) => format!("http://{}", host),
            None => PRODUCTION_HOST.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

/// Blocking Firestore client
pub struct FirestoreStore {
    config: FirestoreConfig,
    client: Client,
    base: Url,
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("project_id", &self.config.project_id)
            .field("base", &self.base.as_str())
            .finish()
    }
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Result<Self> {
        let token = match (&config.access_token, &config.emulator_host) {
            (Some(token), _) => token.clone(),
            // The emulator accepts any bearer token
            (None, Some(_)) => "owner".to_string(),
            (None, None) => {
                return Err(Error::Connection(format!(
                    "no access token: set {} (or {} for a local emulator)",
                    ACCESS_TOKEN_ENV, EMULATOR_HOST_ENV
                )))
            }
        };

        let mut headers = header::HeaderMap::new();
        let auth = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| Error::Malformed(format!("access token: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let base = Url::parse(&config.base_url())
            .map_err(|e| Error::Malformed(format!("firestore host: {}", e)))?;

        Ok(Self {
            config,
            client,
            base,
        })
    }

    /// URL of `tenants/<tenant>` followed by `segments`
    fn document_url(&self, tenant: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Malformed(format!("firestore host is not a base URL: {}", self.base)))?
            .extend([
                "v1",
                "projects",
                self.config.project_id.as_str(),
                "databases",
                "(default)",
                "documents",
                "tenants",
                tenant,
            ])
            .extend(segments);
        Ok(url)
    }
}

impl DocumentStore for FirestoreStore {
    fn tenant_exists(&self, tenant: &str) -> Result<bool> {
        let url = self.document_url(tenant, &[])?;
        let response = self.client.get(url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response)?;
        Ok(true)
    }

    fn list(&self, tenant: &str, collection: &str) -> Result<Vec<RemoteDocument>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.document_url(tenant, &[collection])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", &PAGE_SIZE.to_string());
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page: ListResponse = check_status(self.client.get(url).send()?)?.json()?;
            tracing::debug!(tenant, collection, documents = page.documents.len(), "listed page");
            for doc in page.documents {
                documents.push(decode_document(doc)?);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(documents)
    }

    fn delete(&self, tenant: &str, collection: &str, id: &str) -> Result<()> {
        let url = self.document_url(tenant, &[collection, id])?;
        check_status(self.client.delete(url).send()?)?;
        Ok(())
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(Error::Remote(format!("HTTP {}: {}", status.as_u16(), body.trim())))
}

fn decode_document(doc: FirestoreDocument) -> Result<RemoteDocument> {
    let id = doc
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::Malformed(format!("document without id: {}", doc.name)))?
        .to_string();
    let fields = doc
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect();
    Ok(RemoteDocument::new(id, fields))
}

/// Flatten one Firestore typed value to plain JSON
///
/// Unknown encodings are passed through unchanged.
pub fn decode_value(value: &Value) -> Value {
    let Some(object) = value.as_object() else {
        return value.clone();
    };
    let Some((kind, inner)) = object.iter().next().filter(|_| object.len() == 1) else {
        return value.clone();
    };

    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "doubleValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        // 64-bit integers are sent as strings
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| inner.clone()),
            other => other.clone(),
        },
        "mapValue" => {
            let fields = inner.get("fields").and_then(Value::as_object);
            Value::Object(
                fields
                    .map(|f| f.iter().map(|(k, v)| (k.clone(), decode_value(v))).collect())
                    .unwrap_or_default(),
            )
        }
        "arrayValue" => {
            let values = inner.get("values").and_then(Value::as_array);
            Value::Array(
                values
                    .map(|vs| vs.iter().map(decode_value).collect())
                    .unwrap_or_default(),
            )
        }
        _ => value.clone(),
    }
}
