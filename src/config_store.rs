//! Tenant configuration lookup.
//!
//! API configurations live in Firestore under
//! `tentacles/ApiConfig/<api>/<config>`. The document is read once per
//! message and never cached.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::Config;
use crate::errors::AppError;

/// Root collection holding all connector configuration.
pub const ROOT_COLLECTION: &str = "tentacles";
/// Document under the root collection whose sub-collections are keyed by API.
pub const API_CONFIG_DOCUMENT: &str = "ApiConfig";

/// A configuration document: field name to plain JSON value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiConfigDocument {
    fields: Map<String, Value>,
}

impl ApiConfigDocument {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Value> for ApiConfigDocument {
    /// Non-object values yield an empty document.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }
}

/// Read access to tenant configuration documents.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the configuration named `config` for `api`. A missing document
    /// is `Ok(None)`.
    async fn fetch(&self, api: &str, config: &str) -> Result<Option<ApiConfigDocument>, AppError>;
}

/// Where the Firestore bearer token comes from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Fixed token (emulator, local runs).
    Static(String),
    /// GCE / Cloud Run metadata server, queried on every read.
    Metadata { url: String },
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Firestore REST document.
#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    #[serde(default)]
    fields: Map<String, Value>,
}

/// `ConfigStore` backed by the Firestore REST API.
#[derive(Clone)]
pub struct FirestoreConfigStore {
    client: Client,
    base_url: String,
    project_id: String,
    database: String,
    token_source: TokenSource,
}

impl FirestoreConfigStore {
    pub fn new(
        base_url: String,
        project_id: String,
        database: String,
        token_source: TokenSource,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::InternalError(format!("Failed to create Firestore client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
            database,
            token_source,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let token_source = match &config.firestore_access_token {
            Some(token) => TokenSource::Static(token.clone()),
            None => TokenSource::Metadata {
                url: config.metadata_token_url.clone(),
            },
        };

        Self::new(
            config.firestore_base_url.clone(),
            config.gcp_project_id.clone(),
            config.firestore_database.clone(),
            token_source,
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    /// URL of `tentacles/ApiConfig/<api>/<config>`, with `api` and `config`
    /// percent-encoded as single path segments.
    pub fn document_url(&self, api: &str, config: &str) -> Result<url::Url, AppError> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| AppError::InternalError(format!("Invalid Firestore URL: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| AppError::InternalError("Firestore URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                self.project_id.as_str(),
                "databases",
                self.database.as_str(),
                "documents",
                ROOT_COLLECTION,
                API_CONFIG_DOCUMENT,
                api,
                config,
            ]);

        Ok(url)
    }

    async fn access_token(&self) -> Result<String, AppError> {
        match &self.token_source {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata { url } => {
                let response = self
                    .client
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| {
                        AppError::Unauthorized(format!("Metadata server unreachable: {}", e))
                    })?;

                if !response.status().is_success() {
                    let status = response.status();
                    return Err(AppError::Unauthorized(format!(
                        "Metadata server returned {}",
                        status
                    )));
                }

                let token: MetadataToken = response.json().await.map_err(|e| {
                    AppError::Unauthorized(format!("Failed to parse metadata token: {}", e))
                })?;
                Ok(token.access_token)
            }
        }
    }
}

#[async_trait]
impl ConfigStore for FirestoreConfigStore {
    async fn fetch(&self, api: &str, config: &str) -> Result<Option<ApiConfigDocument>, AppError> {
        let url = self.document_url(api, config)?;
        tracing::debug!("Reading API config {}/{} from Firestore", api, config);

        let token = self.access_token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Firestore request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!("API config {}/{} does not exist", api, config);
            return Ok(None);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Unauthorized(format!(
                "Firestore returned {}: {}",
                status, error_text
            )));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Firestore returned {}: {}",
                status, error_text
            )));
        }

        let document: FirestoreDocument = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Firestore document: {}", e))
        })?;

        Ok(Some(ApiConfigDocument::new(decode_fields(document.fields))))
    }
}

/// Convert Firestore typed field values into plain JSON.
pub fn decode_fields(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(name, value)| (name, decode_value(value)))
        .collect()
}

/// Convert one Firestore `Value` (`{"stringValue": "x"}` etc.) into plain JSON.
/// Unknown shapes are passed through untouched.
pub fn decode_value(value: Value) -> Value {
    let mut typed = match value {
        Value::Object(typed) => typed,
        other => return other,
    };

    if let Some(v) = typed.remove("stringValue") {
        return v;
    }
    if let Some(v) = typed.remove("integerValue") {
        // int64 values are transported as strings
        let parsed = v.as_str().and_then(|s| s.parse::<i64>().ok());
        return parsed.map(Value::from).unwrap_or(v);
    }
    if let Some(v) = typed.remove("doubleValue") {
        return v;
    }
    if let Some(v) = typed.remove("booleanValue") {
        return v;
    }
    if typed.contains_key("nullValue") {
        return Value::Null;
    }
    if let Some(v) = typed.remove("timestampValue") {
        return v;
    }
    if let Some(v) = typed.remove("referenceValue") {
        return v;
    }
    if let Some(Value::Object(mut map)) = typed.remove("mapValue") {
        let fields = match map.remove("fields") {
            Some(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        return Value::Object(decode_fields(fields));
    }
    if let Some(Value::Object(mut array)) = typed.remove("arrayValue") {
        let values = match array.remove("values") {
            Some(Value::Array(values)) => values,
            _ => Vec::new(),
        };
        return Value::Array(values.into_iter().map(decode_value).collect());
    }

    Value::Object(typed)
}
