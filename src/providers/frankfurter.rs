use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

use super::FxProvider;
use crate::error::UpstreamError;
use crate::http::{RetryPolicy, check_status, decode, transport};

const SERVICE: &str = "Frankfurter";
const BASE_URL: &str = "https://api.frankfurter.dev/v1";

/// Frankfurter (ECB reference rates). No API key required.
pub struct FrankfurterClient {
    client: Client,
    policy: RetryPolicy,
    base_url: String,
}

impl FrankfurterClient {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_base_url(policy, BASE_URL)
    }

    pub fn with_base_url(policy: RetryPolicy, base_url: &str) -> Self {
        Self {
            client: policy.client(),
            policy,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

#[async_trait]
impl FxProvider for FrankfurterClient {
    async fn rate(&self, base: &str, target: &str) -> Result<f64, UpstreamError> {
        let base = base.trim().to_uppercase();
        let target = target.trim().to_uppercase();
        if base == target {
            return Ok(1.0);
        }

        let url = format!("{}/latest", self.base_url);
        let (url, client, from, to) = (url.as_str(), &self.client, base.as_str(), target.as_str());
        let resp: RatesResponse = self
            .policy
            .run(move || async move {
                let response = client
                    .get(url)
                    .query(&[("from", from), ("to", to)])
                    .send()
                    .await
                    .map_err(transport(SERVICE))?;
                check_status(SERVICE, response)
                    .await?
                    .json()
                    .await
                    .map_err(decode(SERVICE))
            })
            .await?;

        resp.rates
            .get(&target)
            .copied()
            .filter(|rate| rate.is_finite() && *rate > 0.0)
            .ok_or_else(|| UpstreamError::Payload {
                service: SERVICE,
                message: format!("no {base}/{target} rate in response"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 0,
        }
    }

    #[tokio::test]
    async fn test_same_currency_is_one_without_request() {
        let client = FrankfurterClient::with_base_url(policy(), "http://127.0.0.1:9");
        assert_eq!(client.rate("czk", "CZK").await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_fetches_pair_rate() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/latest")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("from".into(), "USD".into()),
                Matcher::UrlEncoded("to".into(), "CZK".into()),
            ]))
            .with_body(r#"{"amount":1.0,"base":"USD","date":"2025-06-13","rates":{"CZK":21.87}}"#)
            .create_async()
            .await;

        let client = FrankfurterClient::with_base_url(policy(), &server.url());
        assert_eq!(client.rate("usd", "czk").await.unwrap(), 21.87);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_target_rate_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/latest")
            .match_query(Matcher::Any)
            .with_body(r#"{"amount":1.0,"base":"USD","date":"2025-06-13","rates":{}}"#)
            .create_async()
            .await;

        let client = FrankfurterClient::with_base_url(policy(), &server.url());
        let err = client.rate("USD", "XYZ").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Payload { .. }));
    }

    #[tokio::test]
    async fn test_unknown_currency_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/latest")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"message":"not found"}"#)
            .create_async()
            .await;

        let client = FrankfurterClient::with_base_url(policy(), &server.url());
        let err = client.rate("USD", "ABC").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 404, .. }));
    }
}
