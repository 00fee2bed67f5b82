//! Supplemental aggregate dataset fetch.
//!
//! Pulls the yearly population series from a JSON API and stores it next to
//! the mirrored files, wrapped with provenance metadata:
//!
//! ```json
//! { "metadata": { "source": "...", "url": "...", "fetched_at": "...", "total_records": 10 },
//!   "data": [ { "Year": "2018", "Population": 327167439 } ] }
//! ```

use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::{Location, PopulationConfig};
use crate::storage::ObjectStore;
use crate::utils::RetryPolicy;
use crate::utils::http;

pub struct PopulationFetcher {
    client: Client,
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    config: PopulationConfig,
}

impl PopulationFetcher {
    pub fn new(
        client: Client,
        store: Arc<dyn ObjectStore>,
        retry: RetryPolicy,
        config: PopulationConfig,
    ) -> Self {
        Self {
            client,
            store,
            retry,
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.api_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Fetch and store the dataset. Returns the record count, or `None`
    /// when no API URL is configured.
    pub async fn fetch_and_store(&self) -> Result<Option<usize>> {
        let Some(api_url) = self.config.api_url.as_deref().filter(|u| !u.is_empty()) else {
            log::debug!("Population fetch disabled");
            return Ok(None);
        };
        let location = Location::parse(api_url)?;
        let key = self.config.destination_key.as_str();

        log::info!("Fetching population data from {}", location);
        let response = self
            .retry
            .retry("fetch population", || http::fetch_json(&self.client, &location))
            .await?;

        let document = wrap(&location, response)
            .map_err(|message| AppError::dataset(location.as_str(), message))?;
        let total = document["metadata"]["total_records"].as_u64().unwrap_or(0) as usize;

        let body = serde_json::to_vec_pretty(&document)?;
        self.retry
            .retry(&format!("put {key}"), || {
                self.store.put_bytes(key, body.clone(), "application/json", None)
            })
            .await?;

        log::info!("Stored {} population records at {}", total, key);
        Ok(Some(total))
    }
}

fn wrap(location: &Location, mut response: Value) -> std::result::Result<Value, &'static str> {
    let data = match response.get_mut("data").map(Value::take) {
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err("`data` is not an array"),
        None => return Err("response has no `data` field"),
    };
    let source = location.url().host_str().unwrap_or("unknown").to_string();

    Ok(json!({
        "metadata": {
            "source": source,
            "url": location.as_str(),
            "fetched_at": Utc::now().to_rfc3339(),
            "total_records": data.len(),
        },
        "data": data,
    }))
}
