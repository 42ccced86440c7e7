//! Domain-name subgraph client.
//!
//! Read-only external data source listing tokenized domains. When no
//! subgraph URL is configured, or the query fails, a canned domain list
//! stands in so the rest of the app keeps working offline.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::Config;

const NAMES_QUERY: &str =
    "query ListNamesTokens { names { items { name tokens { tokenId owner { id } } } } }";

/// One tokenized domain as surfaced to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

pub struct SubgraphClient {
    http: reqwest::Client,
    url: Option<String>,
    api_key: Option<String>,
}

impl SubgraphClient {
    pub fn new(url: Option<String>, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, url, api_key }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.subgraph_url.clone(), config.subgraph_api_key.clone())
    }

    /// Fetch the domain list, falling back to the canned set when the
    /// subgraph is unconfigured, unreachable, or empty. Never fails.
    pub async fn fetch_domains(&self) -> Vec<DomainRecord> {
        let Some(url) = &self.url else {
            debug!("subgraph URL not set, serving canned domains");
            return mock_domains();
        };
        match self.query_names(url).await {
            Ok(domains) if !domains.is_empty() => domains,
            Ok(_) => {
                debug!("subgraph returned no names, serving canned domains");
                mock_domains()
            }
            Err(e) => {
                warn!("subgraph query failed, serving canned domains: {e:#}");
                mock_domains()
            }
        }
    }

    async fn query_names(&self, url: &str) -> Result<Vec<DomainRecord>> {
        let mut request = self
            .http
            .post(url)
            .json(&serde_json::json!({ "query": NAMES_QUERY }));
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let response = request.send().await.context("subgraph request failed")?;
        anyhow::ensure!(
            response.status().is_success(),
            "subgraph returned HTTP {}",
            response.status()
        );
        let body: Value = response
            .json()
            .await
            .context("subgraph response was not JSON")?;
        if let Some(errors) = body.get("errors") {
            anyhow::bail!("subgraph errors: {errors}");
        }
        Ok(flatten_names(&body))
    }
}

/// Flatten the paginated names response: one record per token, or a bare
/// record for names without tokens.
pub fn flatten_names(body: &Value) -> Vec<DomainRecord> {
    let items = body.pointer("/data/names/items").and_then(Value::as_array);
    let mut out = Vec::new();
    for item in items.into_iter().flatten() {
        let Some(name) = item.get("name").and_then(Value::as_str).filter(|n| !n.is_empty())
        else {
            continue;
        };
        match item.get("tokens").and_then(Value::as_array) {
            Some(tokens) if !tokens.is_empty() => {
                for token in tokens {
                    out.push(DomainRecord {
                        name: name.to_string(),
                        token_id: token
                            .get("tokenId")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        owner: token
                            .pointer("/owner/id")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    });
                }
            }
            _ => out.push(DomainRecord {
                name: name.to_string(),
                token_id: None,
                owner: None,
            }),
        }
    }
    out
}

/// Canned fallback domains, mirroring the mock subgraph document.
pub fn mock_domains() -> Vec<DomainRecord> {
    flatten_names(&mock_names_document())
}

/// The mock subgraph response in the upstream "names" query shape, served
/// verbatim by the mock endpoint.
pub fn mock_names_document() -> Value {
    serde_json::json!({
        "data": {
            "names": {
                "items": [
                    {
                        "name": "alice.doma",
                        "tokens": [
                            {"id": "1", "tokenId": "1", "owner": {"id": "0xAbC000000000000000000000000000000000AbC0"}}
                        ]
                    },
                    {
                        "name": "bob.doma",
                        "tokens": [
                            {"id": "2", "tokenId": "2", "owner": {"id": "0xDef000000000000000000000000000000000Def0"}}
                        ]
                    }
                ]
            }
        }
    })
}
