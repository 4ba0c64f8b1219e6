// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use gridsync_app::{
    ExportRequest, ExportResponse, GridPage, GridSlice, MutationRequest, MutationResponse,
    NavigationRequest, TransportError,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Comma-separated props the server should render for a partial reload.
pub const PARTIAL_HEADER: &str = "X-Grid-Partial";
pub const PRESERVE_STATE_HEADER: &str = "X-Grid-Preserve-State";

const JSON: &str = "application/json";

/// Blocking client for the grid endpoints of one server.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    timeout: Duration,
    http: HttpClient,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            bail!("server.base_url must not be empty");
        }
        let base_url =
            Url::parse(trimmed).with_context(|| format!("parse server.base_url {trimmed:?}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!(
                "server.base_url must use http or https, got {:?}",
                base_url.scheme()
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

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves a server-supplied url, absolute or relative, against the base.
    pub fn resolve(&self, target: &str) -> Result<Url> {
        self.base_url
            .join(target)
            .with_context(|| format!("resolve {target:?} against {}", self.base_url))
    }

    /// Loads the descriptor, initial location and first slice for a grid page.
    pub fn fetch_page(&self, path: &str) -> Result<GridPage> {
        let url = self.resolve(path)?;
        debug!(%url, "fetching grid page");
        let request = self.http.get(url).header(ACCEPT, JSON);
        let mut page: GridPage = self.send(request, "decode grid page")?;
        page.url = self.resolve(&page.url)?.to_string();
        Ok(page)
    }

    pub fn navigate(&self, request: &NavigationRequest) -> Result<GridSlice> {
        debug!(
            token = %request.token,
            url = %request.url,
            only = ?request.only,
            "navigating"
        );
        let mut builder = self.http.get(request.url.clone()).header(ACCEPT, JSON);
        if !request.only.is_empty() {
            builder = builder.header(PARTIAL_HEADER, request.only.join(","));
        }
        if request.preserve_state {
            builder = builder.header(PRESERVE_STATE_HEADER, "1");
        }
        self.send(builder, "decode grid slice")
    }

    pub fn mutate(&self, request: &MutationRequest) -> Result<MutationResponse> {
        let url = self.resolve(&request.url)?;
        debug!(token = %request.token, %url, all = request.payload.all, "posting mutation");
        let builder = self
            .http
            .post(url)
            .header(ACCEPT, JSON)
            .json(&request.payload);
        self.send(builder, "decode mutation response")
    }

    pub fn submit_export(&self, request: &ExportRequest) -> Result<ExportResponse> {
        let url = self.resolve(&request.url)?;
        debug!(token = %request.token, %url, "submitting export");
        let builder = self
            .http
            .post(url)
            .header(ACCEPT, JSON)
            .json(&request.payload);
        self.send(builder, "decode export response")
    }

    fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = builder
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        decode(response, what)
    }
}

/// Flattens a transport failure into what the controller understands.
pub fn transport_error(error: &anyhow::Error) -> TransportError {
    TransportError::failed(format!("{error:#}"))
}

fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        let error = clean_error_response(status, &body);
        warn!(status = status.as_u16(), %error, "server rejected request");
        return Err(error);
    }

    let body = response.text().context("read response body")?;
    if body.trim().is_empty() {
        return serde_json::from_str("{}").with_context(|| what.to_owned());
    }
    serde_json::from_str(&body).with_context(|| what.to_owned())
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn connection_error(base_url: &Url, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!(
            "request to {base_url} timed out -- raise server.timeout or check the server ({error})"
        );
    }
    anyhow!("cannot reach {base_url} -- is the server running? ({error})")
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(message) = parsed.message.or(parsed.error)
        && !message.is_empty()
    {
        return anyhow!("server error ({}): {}", status.as_u16(), message);
    }

    let trimmed = body.trim();
    let plain = !trimmed.contains('<') && !trimmed.contains('{');
    if !trimmed.is_empty() && trimmed.len() < 100 && plain {
        return anyhow!("server error ({}): {}", status.as_u16(), trimmed);
    }

    anyhow!("server returned {}", status.as_u16())
}
