// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use reqboard_app::Row;
use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const SNIPPET_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cannot reach row source {url} ({error})")]
    Unreachable {
        url: String,
        #[source]
        error: reqwest::Error,
    },
    #[error("row source returned {status}: {snippet}")]
    Status { status: u16, snippet: String },
    #[error("row source body is not a JSON array of objects: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct RowSource {
    url: Url,
    timeout: Duration,
    http: HttpClient,
}

impl RowSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = parse_endpoint(url, "source.url")?;
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self { url, timeout, http })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn fetch_rows(&self) -> Result<Vec<Row>, FetchError> {
        let unreachable_error = |error| FetchError::Unreachable {
            url: self.url.to_string(),
            error,
        };

        let response = self
            .http
            .get(self.url.clone())
            .send()
            .map_err(unreachable_error)?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                snippet: snippet(&body),
            });
        }

        let body = response.text().map_err(unreachable_error)?;
        parse_rows(&body)
    }
}

/// Decodes a row source body. Anything other than an array of objects is
/// malformed; an empty array is a valid, empty result.
pub fn parse_rows(body: &str) -> Result<Vec<Row>, FetchError> {
    let value: Value =
        serde_json::from_str(body).map_err(|error| FetchError::Malformed(error.to_string()))?;
    let Value::Array(items) = value else {
        return Err(FetchError::Malformed(format!(
            "expected an array, got {}",
            json_kind(&value)
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(_) => serde_json::from_value::<Row>(item)
                .map_err(|error| FetchError::Malformed(format!("row {index}: {error}"))),
            other => Err(FetchError::Malformed(format!(
                "row {index} is {}, expected an object",
                json_kind(&other)
            ))),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardReceipt {
    pub status: u16,
    pub body: String,
}

impl ForwardReceipt {
    pub fn accepted(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_snippet(&self) -> String {
        snippet(&self.body)
    }
}

/// Posts relay payloads to the downstream automation script unchanged.
#[derive(Debug, Clone)]
pub struct Forwarder {
    url: Url,
    http: HttpClient,
}

impl Forwarder {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = parse_endpoint(url, "relay.downstream_url")?;
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self { url, http })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Fails only when the downstream cannot be reached or read. Any HTTP
    /// status it answers with comes back in the receipt.
    pub fn forward(&self, payload: &[u8]) -> Result<ForwardReceipt> {
        let response = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .map_err(|error| anyhow!("cannot reach downstream {} ({error})", self.url))?;

        let status = response.status();
        let body = response.text().context("read downstream response")?;
        Ok(ForwardReceipt {
            status: status.as_u16(),
            body,
        })
    }
}

pub fn parse_endpoint(raw: &str, key: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("{key} must not be empty");
    }
    let url =
        Url::parse(trimmed).with_context(|| format!("{key} {trimmed:?} is not a valid URL"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => bail!("{key} must use http or https, got {scheme}://"),
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "(empty body)".to_owned();
    }
    trimmed.chars().take(SNIPPET_CHARS).collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
