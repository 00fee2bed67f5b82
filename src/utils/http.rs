// src/utils/http.rs

//! HTTP client utilities.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};

use reqwest::header::{
    CONTENT_LENGTH, CONTENT_TYPE, ETAG, HeaderMap, HeaderName, LAST_MODIFIED, RETRY_AFTER,
};
use reqwest::{Client, Response, StatusCode};
use scraper::{Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Location, SourceConfig};
use crate::storage::{SpoolWriter, SpooledBody};

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &SourceConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .build()?;
    Ok(client)
}

/// Fetch a directory listing and return its body.
///
/// Non-HTML or non-UTF-8 responses are `MalformedListing`.
pub async fn fetch_listing(client: &Client, location: &Location) -> Result<String> {
    let response = send(client.get(location.as_str()), location).await?;

    if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
        let value = content_type.to_str().unwrap_or("").to_ascii_lowercase();
        if !value.contains("html") {
            return Err(AppError::malformed(
                location.as_str(),
                format!("unexpected content type {value:?}"),
            ));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| classify_transport(location, e))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| AppError::malformed(location.as_str(), e))
}

/// Fetch a file's full content.
pub async fn fetch_bytes(client: &Client, location: &Location) -> Result<Vec<u8>> {
    let response = send(client.get(location.as_str()), location).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| classify_transport(location, e))?;
    Ok(bytes.to_vec())
}

/// Stream a file's content into a spool file under `spool_dir`.
///
/// Only one response chunk is held in memory at a time.
pub async fn download_to(
    client: &Client,
    location: &Location,
    spool_dir: &Path,
) -> Result<SpooledBody> {
    let mut response = send(client.get(location.as_str()), location).await?;
    let mut writer = SpoolWriter::create(spool_dir).await?;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| classify_transport(location, e))?
    {
        writer.write(&chunk).await?;
    }
    writer.finish().await
}

/// Fetch a JSON document.
pub async fn fetch_json(client: &Client, location: &Location) -> Result<serde_json::Value> {
    let bytes = fetch_bytes(client, location).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Cheap change token for a remote file.
///
/// Prefers `ETag`, then `Last-Modified` + `Content-Length`. Returns `None`
/// when the origin exposes neither or rejects `HEAD`.
pub async fn probe_fingerprint(client: &Client, location: &Location) -> Result<Option<String>> {
    let response = match send(client.head(location.as_str()), location).await {
        Ok(response) => response,
        Err(AppError::Status { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(fingerprint_from_headers(response.headers()))
}

fn fingerprint_from_headers(headers: &HeaderMap) -> Option<String> {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(etag) = header(ETAG) {
        return Some(etag.to_string());
    }
    match (header(LAST_MODIFIED), header(CONTENT_LENGTH)) {
        (Some(modified), Some(length)) => Some(format!("lm:{modified};len:{length}")),
        _ => None,
    }
}

/// Extract every `a[href]` value from a listing page.
pub fn extract_hrefs(location: &Location, html: &str) -> Result<Vec<String>> {
    let selector = Selector::parse("a[href]")
        .map_err(|e| AppError::malformed(location.as_str(), format!("selector: {e}")))?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .collect())
}

async fn send(request: reqwest::RequestBuilder, location: &Location) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(location, e))?;
    check_status(location, response)
}

fn check_status(location: &Location, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        return Err(AppError::RateLimited {
            context: location.to_string(),
            retry_after,
        });
    }
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return Err(AppError::transient(
            location.as_str(),
            format!("HTTP {}", status.as_u16()),
        ));
    }
    Err(AppError::Status {
        url: location.to_string(),
        status: status.as_u16(),
    })
}

/// `Retry-After` as delta-seconds or an HTTP-date. A date in the past
/// means retry now.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

fn classify_transport(location: &Location, error: reqwest::Error) -> AppError {
    if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
        AppError::transient(location.as_str(), error)
    } else {
        AppError::Http(error)
    }
}
