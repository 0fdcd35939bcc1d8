mod config;
mod db;
mod error;
mod handlers;
mod http;
mod insights;
mod models;
mod parsing;
mod providers;
mod services;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post, put},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::AppError;
use crate::http::RetryPolicy;
use crate::insights::InsightStore;
use crate::providers::{
    FxProvider, HoldingsSource, InsightGenerator, QuoteProvider, finnhub::FinnhubClient,
    frankfurter::FrankfurterClient, gemini::GeminiClient, sheets::GoogleSheetsClient,
};

pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Config,
    pub sheets: Option<Arc<dyn HoldingsSource>>,
    pub quotes: Option<Arc<dyn QuoteProvider>>,
    pub fx: Arc<dyn FxProvider>,
    pub ai: Option<Arc<dyn InsightGenerator>>,
    pub insight_store: Arc<dyn InsightStore>,
}

impl AppState {
    /// Wire up the upstream clients the configuration has credentials for.
    pub fn new(db: sqlx::PgPool, config: Config) -> Self {
        let policy = RetryPolicy {
            timeout: config.upstream_timeout,
            max_retries: config.upstream_max_retries,
        };
        let sheets = config
            .sheets
            .clone()
            .map(|c| Arc::new(GoogleSheetsClient::new(c, policy)) as Arc<dyn HoldingsSource>);
        let quotes = config
            .finnhub_api_key
            .clone()
            .map(|key| Arc::new(FinnhubClient::new(key, policy)) as Arc<dyn QuoteProvider>);
        let ai = config.gemini_api_key.clone().map(|key| {
            Arc::new(GeminiClient::new(key, config.gemini_model.clone(), policy)) as Arc<dyn InsightGenerator>
        });

        Self {
            insight_store: Arc::new(db.clone()),
            db,
            sheets,
            quotes,
            fx: Arc::new(FrankfurterClient::new(policy)),
            ai,
            config,
        }
    }

    pub fn sheets(&self) -> Result<&dyn HoldingsSource, AppError> {
        self.sheets.as_deref().ok_or_else(|| {
            AppError::Config(
                "GOOGLE_SHEETS_ID, GOOGLE_SERVICE_ACCOUNT_EMAIL and GOOGLE_PRIVATE_KEY_BASE64 must be set".into(),
            )
        })
    }

    pub fn quotes(&self) -> Result<&dyn QuoteProvider, AppError> {
        self.quotes
            .as_deref()
            .ok_or_else(|| AppError::Config("FINNHUB_API_KEY is not set".into()))
    }

    pub fn ai(&self) -> Result<&dyn InsightGenerator, AppError> {
        self.ai
            .as_deref()
            .ok_or_else(|| AppError::Config("GEMINI_API_KEY is not set".into()))
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "engine": "rust",
        "reporting_currency": state.config.reporting_currency,
        "integrations": {
            "sheets": state.sheets.is_some(),
            "quotes": state.quotes.is_some(),
            "ai": state.ai.is_some(),
        }
    }))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Ledger
        .route(
            "/api/v1/transactions",
            get(handlers::transactions::list_transactions)
                .post(handlers::transactions::create_transaction),
        )
        .route(
            "/api/v1/transactions/{id}",
            put(handlers::transactions::update_transaction)
                .delete(handlers::transactions::delete_transaction),
        )
        .route(
            "/api/v1/snapshots",
            get(handlers::snapshots::list_snapshots).post(handlers::snapshots::create_snapshot),
        )
        .route(
            "/api/v1/snapshots/{id}",
            put(handlers::snapshots::update_snapshot).delete(handlers::snapshots::delete_snapshot),
        )
        // Holdings
        .route("/api/v1/holdings", get(handlers::holdings::list_holdings))
        .route(
            "/api/v1/holdings/{ticker}",
            put(handlers::holdings::update_holding),
        )
        .route("/api/v1/buy-tip", get(handlers::buy_tip::get_buy_tip))
        // Charts
        .route("/api/v1/overview", get(handlers::overview::get_overview))
        .route(
            "/api/v1/performance",
            get(handlers::overview::get_performance),
        )
        .route("/api/v1/goal", get(handlers::overview::get_goal))
        .route(
            "/api/v1/preferences",
            get(handlers::preferences::get_preferences)
                .put(handlers::preferences::update_preferences),
        )
        // AI insights
        .route("/api/v1/insights", get(handlers::insights::list_insights))
        .route(
            "/api/v1/insights/refresh-all",
            post(handlers::insights::refresh_all),
        )
        .route(
            "/api/v1/insights/{ticker}",
            get(handlers::insights::get_insight),
        )
        .route(
            "/api/v1/insights/{ticker}/refresh",
            post(handlers::insights::refresh_insight),
        )
        // Market
        .route(
            "/api/v1/market/quote/{ticker}",
            get(handlers::market::get_quote),
        )
        .route(
            "/api/v1/market/search",
            get(handlers::market::search_ticker),
        )
        .route("/api/v1/market/fx", get(handlers::market::get_fx_rate))
        // Health check
        .route("/api/v1/status", get(health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stock_tracker_api=info,tower_http=debug")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::new(pool, config));
    if state.sheets.is_none() {
        tracing::warn!("Google Sheets credentials missing, holdings endpoints will fail");
    }
    let app = create_router(state);

    tracing::info!("Stock tracker API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
