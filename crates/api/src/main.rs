use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockwise_core::analytics::error::AnalyticsError;
use stockwise_core::analytics::price::{self, FormattedEstimate, PriceAnalysis, PriceQuery};
use stockwise_core::analytics::recommend::{self, ComparisonRequest, ComparisonResult};
use stockwise_core::domain::period::parse_period;
use stockwise_core::domain::transaction::StoreMetadata;
use stockwise_core::ingest::source::{period_rows_for_store, PgTransactionSource, TransactionSource};
use stockwise_core::storage::transactions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockwise_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match stockwise_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let source = pool
        .clone()
        .map(|p| Arc::new(PgTransactionSource::new(p)) as Arc<dyn TransactionSource>);
    let state = AppState {
        pool,
        source,
        default_top_n: settings.default_top_n,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/stores", get(list_stores))
        .route("/periods", get(list_periods))
        .route("/categories", get(list_categories))
        .route("/products", get(list_products))
        .route("/recommendations", get(get_recommendation))
        .route("/price-estimates", get(get_price_estimate))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    source: Option<Arc<dyn TransactionSource>>,
    default_top_n: usize,
}

impl AppState {
    fn pool(&self) -> Result<&PgPool, StatusCode> {
        self.pool.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }

    fn source(&self) -> Result<&dyn TransactionSource, StatusCode> {
        self.source
            .as_deref()
            .ok_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %format!("{e:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn analytics_status(e: &AnalyticsError) -> StatusCode {
    match e {
        AnalyticsError::UnknownStore(_) => StatusCode::NOT_FOUND,
        AnalyticsError::MalformedRow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AnalyticsError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
    }
}

fn analytics_error(e: AnalyticsError) -> (StatusCode, Json<ApiError>) {
    let status = analytics_status(&e);
    tracing::warn!(error = %e, %status, "analytics request rejected");
    (
        status,
        Json(ApiError {
            error: e.to_string(),
        }),
    )
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn status_only(status: StatusCode) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        }),
    )
}

#[derive(Debug, Deserialize)]
struct StoreFilter {
    city: Option<String>,
}

async fn list_stores(
    State(state): State<AppState>,
    Query(filter): Query<StoreFilter>,
) -> Result<Json<Vec<StoreMetadata>>, StatusCode> {
    let pool = state.pool()?;
    let stores = transactions::store_directory(pool, filter.city.as_deref())
        .await
        .map_err(internal_error)?;
    Ok(Json(stores))
}

async fn list_periods(State(state): State<AppState>) -> Result<Json<Vec<String>>, StatusCode> {
    let pool = state.pool()?;
    let periods = transactions::distinct_periods(pool)
        .await
        .map_err(internal_error)?;
    Ok(Json(periods))
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<String>>, StatusCode> {
    let pool = state.pool()?;
    let categories = transactions::distinct_categories(pool)
        .await
        .map_err(internal_error)?;
    Ok(Json(categories))
}

#[derive(Debug, Deserialize)]
struct ProductFilter {
    category: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ProductEntry {
    category: String,
    description: String,
}

/// Distinct products, for picking a price-estimate target.
async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Vec<ProductEntry>>, StatusCode> {
    let pool = state.pool()?;
    let products = transactions::distinct_products(pool, filter.category.as_deref())
        .await
        .map_err(internal_error)?
        .into_iter()
        .map(|(category, description)| ProductEntry {
            category,
            description,
        })
        .collect();
    Ok(Json(products))
}

#[derive(Debug, Deserialize)]
struct RecommendationParams {
    store_id: String,
    category: String,
    period: String,
    top_n: Option<usize>,
}

async fn get_recommendation(
    State(state): State<AppState>,
    Query(params): Query<RecommendationParams>,
) -> ApiResult<ComparisonResult> {
    let source = state.source().map_err(status_only)?;
    let period = parse_period(&params.period).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: format!("{e:#}"),
            }),
        )
    })?;

    let (rows, directory) = period_rows_for_store(source, &period, &params.store_id)
        .await
        .map_err(|e| status_only(internal_error(e)))?;

    let req = ComparisonRequest {
        store_id: &params.store_id,
        category: &params.category,
        period: &period,
        top_n: params.top_n.unwrap_or(state.default_top_n),
    };
    let result = recommend::compare_with_directory(&req, &rows, directory.as_ref())
        .map_err(analytics_error)?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct PriceParams {
    description: String,
    cluster: Option<i64>,
    period: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiPriceEstimate {
    description: String,
    formatted: FormattedEstimate,
    #[serde(flatten)]
    analysis: PriceAnalysis,
}

async fn get_price_estimate(
    State(state): State<AppState>,
    Query(params): Query<PriceParams>,
) -> ApiResult<ApiPriceEstimate> {
    let source = state.source().map_err(status_only)?;
    let rows = source
        .rows_for_description(&params.description)
        .await
        .map_err(|e| status_only(internal_error(e)))?;

    let query = PriceQuery {
        description: &params.description,
        peer_cluster: params.cluster,
        period: params.period.as_deref(),
    };
    let analysis = price::analyze(&rows, &query).map_err(analytics_error)?;

    Ok(Json(ApiPriceEstimate {
        description: params.description.clone(),
        formatted: analysis.estimate.formatted(),
        analysis,
    }))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &stockwise_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analytics_errors_map_to_client_statuses() {
        assert_eq!(
            analytics_status(&AnalyticsError::UnknownStore("S1".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            analytics_status(&AnalyticsError::InvalidArgument("top_n".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            analytics_status(&AnalyticsError::MalformedRow {
                row: 3,
                field: "units_sold",
                reason: "must be >= 0".to_string(),
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn degraded_state_reports_unavailable() {
        let state = AppState {
            pool: None,
            source: None,
            default_top_n: 5,
        };
        assert_eq!(state.pool().err(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(state.source().is_err());
    }

    #[test]
    fn product_filter_category_is_optional() {
        let uri: axum::http::Uri = "/products?category=Beverage%3A%20Soda".parse().unwrap();
        let Query(filter) = Query::<ProductFilter>::try_from_uri(&uri).unwrap();
        assert_eq!(filter.category.as_deref(), Some("Beverage: Soda"));

        let uri: axum::http::Uri = "/products".parse().unwrap();
        let Query(filter) = Query::<ProductFilter>::try_from_uri(&uri).unwrap();
        assert_eq!(filter.category, None);
    }

    #[tokio::test]
    async fn product_listing_without_database_is_unavailable() {
        let state = AppState {
            pool: None,
            source: None,
            default_top_n: 5,
        };
        let res = list_products(State(state), Query(ProductFilter { category: None })).await;
        assert_eq!(res.err(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }
}
