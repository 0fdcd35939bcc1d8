use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::HoldingsSource;
use crate::config::SheetsConfig;
use crate::error::UpstreamError;
use crate::http::{RetryPolicy, check_status, decode, transport};
use crate::models::Holding;
use crate::parsing::parse_locale_number;

const SERVICE: &str = "Google Sheets";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://sheets.googleapis.com";
const SCOPE_READONLY: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
const SCOPE_READWRITE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Sheet columns, in order.
const COL_TICKER: usize = 0;
const COL_NAME: usize = 1;
const COL_SHARES: usize = 2;
const COL_AVG_PRICE: usize = 3;
const COL_CURRENT_PRICE: usize = 4;
const COL_PERCENT_DIFF: usize = 5;
const COL_VALUE_NATIVE: usize = 6;
const COL_PROFIT_NATIVE: usize = 7;
const COL_WEIGHT: usize = 8;
const COL_RECOMMENDATION: usize = 9;
const COL_CURRENCY: usize = 10;
const COL_VALUE_REPORTING: usize = 11;
const COL_PROFIT_REPORTING: usize = 12;

/// Reads the portfolio tab with a service account.
pub struct GoogleSheetsClient {
    client: Client,
    policy: RetryPolicy,
    config: SheetsConfig,
    token_url: String,
    api_base: String,
    tokens: Mutex<HashMap<&'static str, CachedToken>>,
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Serialize)]
struct ValueUpdate {
    values: Vec<Vec<f64>>,
}

/// `Portfólio!A2:M` split into the tab name and the first data row.
#[derive(Debug, PartialEq)]
struct RangeRef<'a> {
    sheet: &'a str,
    first_row: usize,
}

impl<'a> RangeRef<'a> {
    fn parse(range: &'a str) -> Option<Self> {
        let (sheet, cells) = range.rsplit_once('!')?;
        let start = cells.split(':').next()?;
        let first_row = start
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .parse()
            .unwrap_or(1);
        Some(Self {
            sheet: sheet.trim_matches('\''),
            first_row,
        })
    }
}

impl GoogleSheetsClient {
    pub fn new(config: SheetsConfig, policy: RetryPolicy) -> Self {
        Self::with_endpoints(config, policy, TOKEN_URL, API_BASE)
    }

    pub fn with_endpoints(config: SheetsConfig, policy: RetryPolicy, token_url: &str, api_base: &str) -> Self {
        Self {
            client: policy.client(),
            policy,
            config,
            token_url: token_url.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Bearer token for `scope`, reused until shortly before it expires.
    async fn access_token(&self, scope: &'static str) -> Result<String, UpstreamError> {
        // Held across the exchange so concurrent callers share one refresh.
        let mut tokens = self.tokens.lock().await;
        if let Some(cached) = tokens.get(scope).filter(|c| Instant::now() < c.refresh_at) {
            return Ok(cached.access_token.clone());
        }

        let fresh = self.exchange_token(scope).await?;
        let ttl = Duration::from_secs(fresh.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS));
        tokens.insert(
            scope,
            CachedToken {
                access_token: fresh.access_token.clone(),
                refresh_at: Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_MARGIN),
            },
        );
        Ok(fresh.access_token)
    }

    async fn exchange_token(&self, scope: &str) -> Result<TokenResponse, UpstreamError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.config.service_account_email,
            scope,
            aud: &self.token_url,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.config.private_key_pem.as_bytes()).map_err(|e| {
            UpstreamError::Auth {
                service: SERVICE,
                message: format!("invalid service account key: {e}"),
            }
        })?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(|e| {
            UpstreamError::Auth {
                service: SERVICE,
                message: e.to_string(),
            }
        })?;

        let (client, url, assertion) = (&self.client, self.token_url.as_str(), assertion.as_str());
        let token: TokenResponse = self
            .policy
            .run(move || async move {
                let response = client
                    .post(url)
                    .form(&[("grant_type", JWT_GRANT), ("assertion", assertion)])
                    .send()
                    .await
                    .map_err(transport(SERVICE))?;
                check_status(SERVICE, response)
                    .await?
                    .json()
                    .await
                    .map_err(|e| UpstreamError::Auth {
                        service: SERVICE,
                        message: e.to_string(),
                    })
            })
            .await?;
        Ok(token)
    }

    fn values_url(&self, range: &str) -> Result<Url, UpstreamError> {
        let bad_url = || UpstreamError::Payload {
            service: SERVICE,
            message: format!("cannot build URL from {}", self.api_base),
        };
        let mut url = Url::parse(&self.api_base).map_err(|_| bad_url())?;
        url.path_segments_mut()
            .map_err(|_| bad_url())?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.config.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    async fn get_values(&self, range: &str, token: &str) -> Result<Vec<Vec<String>>, UpstreamError> {
        let url = self.values_url(range)?;
        let (client, url) = (&self.client, &url);
        let body: ValueRange = self
            .policy
            .run(move || async move {
                let response = client
                    .get(url.clone())
                    .bearer_auth(token)
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

        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Map one positional row to a holding. Missing trailing cells read as
/// blank; blank numerics are zero.
pub fn holding_from_row(row: &[String]) -> Holding {
    let text = |idx: usize| row.get(idx).map(|s| s.trim()).unwrap_or_default();
    let number = |idx: usize| parse_locale_number(row.get(idx).map(String::as_str));

    let currency = text(COL_CURRENCY);
    Holding {
        ticker: text(COL_TICKER).to_string(),
        name: text(COL_NAME).to_string(),
        shares: number(COL_SHARES),
        average_price: number(COL_AVG_PRICE),
        current_price: number(COL_CURRENT_PRICE),
        percent_diff: number(COL_PERCENT_DIFF),
        value_native: number(COL_VALUE_NATIVE),
        profit_native: number(COL_PROFIT_NATIVE),
        weight_pct: number(COL_WEIGHT),
        recommendation: text(COL_RECOMMENDATION).to_string(),
        currency: if currency.is_empty() {
            "USD".to_string()
        } else {
            currency.to_uppercase()
        },
        value_reporting: number(COL_VALUE_REPORTING),
        profit_reporting: number(COL_PROFIT_REPORTING),
    }
}

#[async_trait]
impl HoldingsSource for GoogleSheetsClient {
    async fn fetch_holdings(&self) -> Result<Vec<Holding>, UpstreamError> {
        let token = self.access_token(SCOPE_READONLY).await?;
        let rows = self.get_values(&self.config.range, &token).await?;
        Ok(rows
            .iter()
            .map(|row| holding_from_row(row))
            .filter(|h| !h.ticker.is_empty())
            .collect())
    }

    async fn update_position(
        &self,
        ticker: &str,
        shares: f64,
        average_price: f64,
    ) -> Result<bool, UpstreamError> {
        let range = RangeRef::parse(&self.config.range).ok_or_else(|| UpstreamError::Payload {
            service: SERVICE,
            message: format!("cannot locate sheet in range {}", self.config.range),
        })?;
        let token = self.access_token(SCOPE_READWRITE).await?;

        let ticker_column = format!("{}!A{}:A", range.sheet, range.first_row);
        let tickers = self.get_values(&ticker_column, &token).await?;
        let Some(offset) = tickers
            .iter()
            .position(|row| row.first().is_some_and(|t| t.trim().eq_ignore_ascii_case(ticker)))
        else {
            return Ok(false);
        };
        let row_number = range.first_row + offset;

        let target = format!("{}!C{row_number}:D{row_number}", range.sheet);
        let mut url = self.values_url(&target)?;
        url.query_pairs_mut().append_pair("valueInputOption", "USER_ENTERED");
        let payload = ValueUpdate {
            values: vec![vec![shares, average_price]],
        };
        let (client, url, token, payload) = (&self.client, &url, token.as_str(), &payload);
        self.policy
            .run(move || async move {
                let response = client
                    .put(url.clone())
                    .bearer_auth(token)
                    .json(payload)
                    .send()
                    .await
                    .map_err(transport(SERVICE))?;
                check_status(SERVICE, response).await.map(|_| ())
            })
            .await?;

        tracing::info!(ticker, row = row_number, "updated position in sheet");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    const TEST_KEY: &str = include_str!("../../testdata/service_account_key.pem");

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn sheets_config() -> SheetsConfig {
        SheetsConfig {
            spreadsheet_id: "sheet-123".into(),
            service_account_email: "bot@example.iam.gserviceaccount.com".into(),
            private_key_pem: TEST_KEY.into(),
            range: "Portfolio!A2:M".into(),
        }
    }

    fn client_for(server: &mockito::Server) -> GoogleSheetsClient {
        GoogleSheetsClient::with_endpoints(
            sheets_config(),
            RetryPolicy {
                timeout: Duration::from_secs(5),
                max_retries: 0,
            },
            &format!("{}/token", server.url()),
            &server.url(),
        )
    }

    async fn mock_token(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), JWT_GRANT.into()))
            .with_body(r#"{"access_token":"ya29.test","expires_in":3599,"token_type":"Bearer"}"#)
            .create_async()
            .await
    }

    #[test]
    fn test_full_row() {
        let h = holding_from_row(&row(&[
            "AAPL", "Apple Inc.", "12,5", "150,20", "180.40", "20,11", "2 255,00", "377,50", "8,3",
            "Hold", "usd", "49 321,50", "8 257,75",
        ]));
        assert_eq!(h.ticker, "AAPL");
        assert_eq!(h.name, "Apple Inc.");
        assert_eq!(h.shares, 12.5);
        assert_eq!(h.average_price, 150.2);
        assert_eq!(h.current_price, 180.4);
        assert_eq!(h.value_native, 2255.0);
        assert_eq!(h.weight_pct, 8.3);
        assert_eq!(h.recommendation, "Hold");
        assert_eq!(h.currency, "USD");
        assert_eq!(h.value_reporting, 49321.5);
        assert_eq!(h.profit_reporting, 8257.75);
    }

    #[test]
    fn test_formatted_cells() {
        let h = holding_from_row(&row(&[
            "CEZ", "ČEZ", "10", "900,50 Kč", "$180.40", "5,23 %", "1 234,56 Kč", "-12.5%", "12.5%", "Buy",
            "CZK",
        ]));
        assert_eq!(h.average_price, 900.5);
        assert_eq!(h.current_price, 180.4);
        assert_eq!(h.percent_diff, 5.23);
        assert_eq!(h.value_native, 1234.56);
        assert_eq!(h.profit_native, -12.5);
        assert_eq!(h.weight_pct, 12.5);
    }

    #[test]
    fn test_short_row_defaults() {
        let h = holding_from_row(&row(&["MSFT", "Microsoft", "3"]));
        assert_eq!(h.shares, 3.0);
        assert_eq!(h.average_price, 0.0);
        assert_eq!(h.weight_pct, 0.0);
        assert_eq!(h.recommendation, "");
        assert_eq!(h.currency, "USD");
    }

    #[test]
    fn test_unparseable_cells_are_zero() {
        let h = holding_from_row(&row(&["X", "X corp", "#N/A", "", "abc"]));
        assert_eq!(h.shares, 0.0);
        assert_eq!(h.average_price, 0.0);
        assert_eq!(h.current_price, 0.0);
    }

    #[test]
    fn test_range_ref_parse() {
        assert_eq!(
            RangeRef::parse("Portfólio!A2:M"),
            Some(RangeRef {
                sheet: "Portfólio",
                first_row: 2
            })
        );
        assert_eq!(
            RangeRef::parse("'My Stocks'!B5:M"),
            Some(RangeRef {
                sheet: "My Stocks",
                first_row: 5
            })
        );
        assert_eq!(RangeRef::parse("A2:M"), None);
    }

    #[tokio::test]
    async fn test_fetch_holdings_skips_blank_rows() {
        let mut server = mockito::Server::new_async().await;
        let token = mock_token(&mut server).await;
        let values = server
            .mock("GET", "/v4/spreadsheets/sheet-123/values/Portfolio!A2:M")
            .match_header("authorization", "Bearer ya29.test")
            .with_body(
                r#"{"range":"Portfolio!A2:M13","majorDimension":"ROWS","values":[
                    ["AAPL","Apple","10","150","180","20","1800","300","60","Hold","USD","40000","6000"],
                    [],
                    ["CEZ","ČEZ","5","900,5","1 010","12,1","5050","552,5","40","Buy","CZK","5050","552,5"]
                ]}"#,
            )
            .create_async()
            .await;

        let holdings = client_for(&server).fetch_holdings().await.unwrap();
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[1].ticker, "CEZ");
        assert_eq!(holdings[1].average_price, 900.5);
        assert_eq!(holdings[1].current_price, 1010.0);
        token.assert_async().await;
        values.assert_async().await;
    }

    #[tokio::test]
    async fn test_access_token_reused_until_expiry() {
        let mut server = mockito::Server::new_async().await;
        let token = server
            .mock("POST", "/token")
            .with_body(r#"{"access_token":"ya29.test","expires_in":3599,"token_type":"Bearer"}"#)
            .expect(1)
            .create_async()
            .await;
        let values = server
            .mock("GET", "/v4/spreadsheets/sheet-123/values/Portfolio!A2:M")
            .match_header("authorization", "Bearer ya29.test")
            .with_body(r#"{"values":[["AAPL","Apple","1"]]}"#)
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&server);
        client.fetch_holdings().await.unwrap();
        client.fetch_holdings().await.unwrap();
        token.assert_async().await;
        values.assert_async().await;
    }

    #[tokio::test]
    async fn test_access_token_refreshed_when_near_expiry() {
        let mut server = mockito::Server::new_async().await;
        let token = server
            .mock("POST", "/token")
            .with_body(r#"{"access_token":"ya29.short","expires_in":30}"#)
            .expect(2)
            .create_async()
            .await;
        server
            .mock("GET", "/v4/spreadsheets/sheet-123/values/Portfolio!A2:M")
            .with_body(r#"{"values":[]}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        client.fetch_holdings().await.unwrap();
        client.fetch_holdings().await.unwrap();
        token.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_holdings_empty_sheet() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("GET", Matcher::Regex(r"^/v4/spreadsheets/sheet-123/values/".into()))
            .with_body(r#"{"range":"Portfolio!A2:M","majorDimension":"ROWS"}"#)
            .create_async()
            .await;

        assert!(client_for(&server).fetch_holdings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_token_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let err = client_for(&server).fetch_holdings().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_update_position_writes_matching_row() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("GET", "/v4/spreadsheets/sheet-123/values/Portfolio!A2:A")
            .with_body(r#"{"values":[["AAPL"],["MSFT"],["CEZ"]]}"#)
            .create_async()
            .await;
        let update = server
            .mock("PUT", "/v4/spreadsheets/sheet-123/values/Portfolio!C3:D3")
            .match_query(Matcher::UrlEncoded("valueInputOption".into(), "USER_ENTERED".into()))
            .match_body(Matcher::Json(serde_json::json!({"values": [[7.0, 310.5]]})))
            .with_body(r#"{"updatedCells":2}"#)
            .create_async()
            .await;

        let updated = client_for(&server).update_position("MSFT", 7.0, 310.5).await.unwrap();
        assert!(updated);
        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_position_unknown_ticker() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("GET", "/v4/spreadsheets/sheet-123/values/Portfolio!A2:A")
            .with_body(r#"{"values":[["AAPL"]]}"#)
            .create_async()
            .await;

        let updated = client_for(&server).update_position("TSLA", 1.0, 1.0).await.unwrap();
        assert!(!updated);
    }
}
