use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::QuoteProvider;
use crate::error::UpstreamError;
use crate::http::{RetryPolicy, check_status, decode, transport};
use crate::models::SymbolMatch;

const SERVICE: &str = "Finnhub";
const BASE_URL: &str = "https://finnhub.io";
const TOKEN_HEADER: &str = "X-Finnhub-Token";

/// Finnhub quote and symbol search.
pub struct FinnhubClient {
    client: Client,
    policy: RetryPolicy,
    base_url: String,
    api_key: String,
}

impl FinnhubClient {
    pub fn new(api_key: String, policy: RetryPolicy) -> Self {
        Self::with_base_url(api_key, policy, BASE_URL)
    }

    pub fn with_base_url(api_key: String, policy: RetryPolicy, base_url: &str) -> Self {
        Self {
            client: policy.client(),
            policy,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let url = format!("{}{path}", self.base_url);
        let (url, client, token) = (url.as_str(), &self.client, self.api_key.as_str());
        self.policy
            .run(move || async move {
                let response = client
                    .get(url)
                    .query(params)
                    .header(TOKEN_HEADER, token)
                    .send()
                    .await
                    .map_err(transport(SERVICE))?;
                check_status(SERVICE, response)
                    .await?
                    .json::<T>()
                    .await
                    .map_err(decode(SERVICE))
            })
            .await
    }
}

// ── Finnhub response types ──

#[derive(Deserialize)]
struct QuoteResponse {
    c: Option<f64>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    symbol: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[async_trait]
impl QuoteProvider for FinnhubClient {
    async fn quote(&self, symbol: &str) -> Result<Option<f64>, UpstreamError> {
        let resp: QuoteResponse = self.get("/api/v1/quote", &[("symbol", symbol)]).await?;
        // Finnhub answers unknown symbols with c = 0.
        Ok(resp.c.filter(|price| price.is_finite() && *price > 0.0))
    }

    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>, UpstreamError> {
        let resp: SearchResponse = self.get("/api/v1/search", &[("q", query)]).await?;
        Ok(resp
            .result
            .into_iter()
            .map(|item| SymbolMatch {
                symbol: item.symbol,
                name: item.description,
                kind: item.kind,
            })
            .collect())
    }
}
