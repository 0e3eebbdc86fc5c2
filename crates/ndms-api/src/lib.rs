// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod memory;

pub use memory::MemoryBackend;

use anyhow::{Context, Result, bail};
use ndms_app::{
    DisasterType, FilterQuery, NdmsError, Record, RecordIdentity, Transport, records_from_value,
    schema_for,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Blocking HTTP client for the `/api/v1/ndms` backend.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("api.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {:?} -- e.g. http://localhost:8080",
                parsed.scheme()
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn list_url(&self, kind: DisasterType) -> String {
        format!("{}{}", self.base_url, schema_for(kind).list_path())
    }

    /// Filter endpoint with `query` URL-encoded in order. An empty query
    /// yields the bare endpoint.
    pub fn filter_url(&self, kind: DisasterType, query: &FilterQuery) -> Result<Url> {
        let raw = format!("{}{}", self.base_url, schema_for(kind).filter_path());
        let mut url = Url::parse(&raw).with_context(|| format!("build filter URL {raw:?}"))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub fn alter_url(&self, kind: DisasterType, identity: &RecordIdentity) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("parse base URL {:?}", self.base_url))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| anyhow::anyhow!("base URL {:?} cannot carry a path", self.base_url))?;
            segments.pop_if_empty();
            for segment in schema_for(kind).alter_path("").split('/') {
                if !segment.is_empty() {
                    segments.push(segment);
                }
            }
            segments.push(identity.as_str());
        }
        Ok(url)
    }

    fn get_records(&self, url: &str, kind: DisasterType) -> Result<Vec<Record>, NdmsError> {
        tracing::debug!(%kind, url, "GET listing");
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|error| NdmsError::FetchFailed(connection_error(&self.base_url, &error)))?;
        let body = read_success(response).map_err(NdmsError::FetchFailed)?;
        let value: Value = serde_json::from_str(&body).map_err(|error| {
            NdmsError::FetchFailed(format!("decode {kind} listing: {error}"))
        })?;
        records_from_value(value)
    }
}

impl Transport for Client {
    fn fetch_all(&self, kind: DisasterType) -> Result<Vec<Record>, NdmsError> {
        self.get_records(&self.list_url(kind), kind)
    }

    fn fetch_filtered(
        &self,
        kind: DisasterType,
        query: &FilterQuery,
    ) -> Result<Vec<Record>, NdmsError> {
        let url = self
            .filter_url(kind, query)
            .map_err(|error| NdmsError::FetchFailed(format!("{error:#}")))?;
        self.get_records(url.as_str(), kind)
    }

    /// Sends the merged record. A success body that is not a JSON object is
    /// answered with the submitted payload; the caller refetches anyway.
    fn update(
        &self,
        kind: DisasterType,
        identity: &RecordIdentity,
        payload: &Record,
    ) -> Result<Record, NdmsError> {
        let commit_failed = |message: String| NdmsError::CommitFailed { message };
        let url = self
            .alter_url(kind, identity)
            .map_err(|error| commit_failed(format!("{error:#}")))?;
        tracing::debug!(%kind, %identity, url = %url, "PUT record");

        let response = self
            .http
            .put(url)
            .json(payload)
            .send()
            .map_err(|error| commit_failed(connection_error(&self.base_url, &error)))?;
        let body = read_success(response).map_err(commit_failed)?;

        let updated = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(Record::from_value)
            .unwrap_or_else(|| payload.clone());
        Ok(updated)
    }
}

fn read_success(response: Response) -> Result<String, String> {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    if status.is_success() {
        Ok(body)
    } else {
        Err(clean_error_response(status, &body))
    }
}

fn connection_error(base_url: &str, error: &reqwest::Error) -> String {
    if error.is_timeout() {
        return format!("{base_url} timed out -- raise [api].timeout or check the backend ({error})");
    }
    format!("cannot reach {base_url} -- check [api].base_url or NDMS_API_URL ({error})")
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Text(String),
    Detail { message: String },
}

fn clean_error_response(status: StatusCode, body: &str) -> String {
    let code = status.as_u16();
    if let Ok(parsed) = serde_json::from_str::<MessageEnvelope>(body)
        && let Some(message) = parsed.message
        && !message.trim().is_empty()
    {
        return format!("server error ({code}): {}", message.trim());
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(error) = parsed.error
    {
        let message = match error {
            ErrorField::Text(text) => text,
            ErrorField::Detail { message } => message,
        };
        if !message.trim().is_empty() {
            return format!("server error ({code}): {}", message.trim());
        }
    }

    let body = body.trim();
    if !body.is_empty() && body.len() < 100 && !body.contains('{') {
        return format!("server error ({code}): {body}");
    }

    format!("server returned {code}")
}

#[cfg(test)]
mod tests {
    use super::{Client, clean_error_response};
    use ndms_app::{DisasterType, RecordIdentity};
    use reqwest::StatusCode;
    use std::time::Duration;

    fn client(base: &str) -> Client {
        Client::new(base, Duration::from_secs(1)).expect("client should initialize")
    }

    #[test]
    fn new_rejects_empty_and_non_http_urls() {
        assert!(Client::new("  ", Duration::from_secs(1)).is_err());
        let error = Client::new("ftp://example.com", Duration::from_secs(1))
            .expect_err("ftp is not supported");
        assert!(error.to_string().contains("http or https"));
    }

    #[test]
    fn urls_follow_backend_routes() {
        let client = client("http://localhost:8080/");
        assert_eq!(
            client.list_url(DisasterType::Flood),
            "http://localhost:8080/api/v1/ndms/floods/all"
        );
        let filter = client
            .filter_url(
                DisasterType::Earthquake,
                &vec![
                    ("soil_type".to_owned(), "soft clay".to_owned()),
                    ("depth_km".to_owned(), "10".to_owned()),
                ],
            )
            .expect("filter URL");
        assert_eq!(
            filter.as_str(),
            "http://localhost:8080/api/v1/ndms/earthquakes/filter?soil_type=soft+clay&depth_km=10"
        );
        let alter = client
            .alter_url(DisasterType::Firestorm, &RecordIdentity::new("a/b"))
            .expect("alter URL");
        assert_eq!(
            alter.as_str(),
            "http://localhost:8080/api/v1/ndms/firestorms/alter/a%2Fb"
        );
    }

    #[test]
    fn empty_query_has_no_question_mark() {
        let url = client("http://localhost:8080")
            .filter_url(DisasterType::Flood, &Vec::new())
            .expect("filter URL");
        assert_eq!(url.as_str(), "http://localhost:8080/api/v1/ndms/floods/filter");
    }

    #[test]
    fn clean_error_response_prefers_structured_messages() {
        assert_eq!(
            clean_error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                r#"{"message":"depth must be positive"}"#
            ),
            "server error (422): depth must be positive"
        );
        assert_eq!(
            clean_error_response(StatusCode::NOT_FOUND, r#"{"error":"no such record"}"#),
            "server error (404): no such record"
        );
        assert_eq!(
            clean_error_response(
                StatusCode::BAD_REQUEST,
                r#"{"error":{"message":"bad soil type"}}"#
            ),
            "server error (400): bad soil type"
        );
        assert_eq!(
            clean_error_response(StatusCode::BAD_GATEWAY, "upstream down"),
            "server error (502): upstream down"
        );
        assert_eq!(
            clean_error_response(StatusCode::INTERNAL_SERVER_ERROR, "{\"trace\": []}"),
            "server returned 500"
        );
    }
}
