use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::{Config, Provider},
    forecast::{
        types::{DailyForecast, TemperatureUnit, WeatherReport},
        LocationQuery,
    },
    service::{AiAnswer, ChatReply, CityValidation, EventPlan, ServiceError, WeatherService},
    store::{Store, StoreError, StoreKey},
    utils::{self, ErrorResponse},
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<WeatherService>,
    pub store: Arc<Store>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message, code)))
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match &e {
            ServiceError::Validation(msg) => api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            ServiceError::NotFound(msg) => api_error(StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ServiceError::Upstream(_) => {
                api_error(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", &e.to_string())
            }
            ServiceError::Store(inner) => store_error(inner),
        }
    }
}

fn store_error(e: &StoreError) -> ApiError {
    match e {
        StoreError::NotFound(msg) => api_error(StatusCode::NOT_FOUND, "NOT_FOUND", msg),
        StoreError::InvalidData(msg) => api_error(StatusCode::BAD_REQUEST, "INVALID_DATA", msg),
        StoreError::Database(_) => {
            tracing::error!("Store failure: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", "Storage unavailable")
        }
    }
}

// Request/Response types
#[derive(Debug, Default, Deserialize)]
pub struct LocationParams {
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub unit: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CityParams {
    pub city: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(flatten)]
    pub location: LocationParams,
}

#[derive(Debug, Deserialize)]
pub struct EventAdviceRequest {
    pub title: String,
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub location: LocationParams,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub weather_provider: Provider,
    pub ai_provider: Provider,
}

#[derive(Debug, Serialize)]
pub struct WeatherResponse {
    pub report: WeatherReport,
    pub cached: bool,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DailyResponse {
    pub location: String,
    pub unit: TemperatureUnit,
    pub daily: Vec<DailyForecast>,
    pub warning: Option<String>,
    pub cached: bool,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    #[serde(flatten)]
    pub answer: AiAnswer<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    #[serde(flatten)]
    pub answer: AiAnswer<Vec<String>>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StoredValueResponse {
    pub user_id: Uuid,
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Turn request parameters into a location and unit, filling gaps from the
/// user's stored preferences. Explicit parameters always win.
async fn resolve_location(
    state: &AppState,
    params: &LocationParams,
) -> Result<(Option<LocationQuery>, TemperatureUnit), ApiError> {
    let prefs = match params.user_id {
        Some(user_id) => state.store.preferences(user_id).await.map_err(|e| store_error(&e))?,
        None => Default::default(),
    };

    let unit = match params.unit.as_deref() {
        Some(raw) => raw
            .parse::<TemperatureUnit>()
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", &e))?,
        None => prefs.unit.unwrap_or_default(),
    };

    let query = match (params.lat, params.lon) {
        (Some(lat), Some(lon)) => {
            utils::validate_coordinates(lat, lon)
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", &e))?;
            Some(LocationQuery::Coordinates { lat, lon })
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Both lat and lon are required",
            ));
        }
        (None, None) => match params.city.as_ref().or(prefs.city.as_ref()) {
            Some(city) => {
                let city = utils::validate_city_name(city)
                    .map_err(|e| api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", &e))?;
                Some(LocationQuery::City(city))
            }
            None => None,
        },
    };

    Ok((query, unit))
}

async fn require_location(
    state: &AppState,
    params: &LocationParams,
) -> Result<(LocationQuery, TemperatureUnit), ApiError> {
    match resolve_location(state, params).await? {
        (Some(query), unit) => Ok((query, unit)),
        (None, _) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "A city or lat/lon pair is required",
        )),
    }
}

// Route handlers
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        weather_provider: state.config.weather_provider.clone(),
        ai_provider: state.config.ai_provider.clone(),
    })
}

pub async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<WeatherResponse>, ApiError> {
    let (query, unit) = require_location(&state, &params).await?;
    let gated = state.service.report(&query, unit, false).await?;

    Ok(Json(WeatherResponse {
        report: gated.payload,
        cached: gated.from_cache,
        fetched_at: gated.fetched_at,
    }))
}

pub async fn refresh_weather(
    State(state): State<AppState>,
    Json(params): Json<LocationParams>,
) -> Result<Json<WeatherResponse>, ApiError> {
    let (query, unit) = require_location(&state, &params).await?;
    tracing::info!("Manual refresh for {}", query);
    let gated = state.service.report(&query, unit, true).await?;

    Ok(Json(WeatherResponse {
        report: gated.payload,
        cached: gated.from_cache,
        fetched_at: gated.fetched_at,
    }))
}

pub async fn get_daily_forecast(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<DailyResponse>, ApiError> {
    let (query, unit) = require_location(&state, &params).await?;
    let gated = state.service.report(&query, unit, false).await?;
    let report = gated.payload;

    Ok(Json(DailyResponse {
        location: report.location,
        unit: report.unit,
        daily: report.daily,
        warning: report.warning,
        cached: gated.from_cache,
    }))
}

pub async fn validate_city(
    State(state): State<AppState>,
    Query(params): Query<CityParams>,
) -> Result<Json<CityValidation>, ApiError> {
    let validation = state.service.validate_city(&params.city).await?;
    Ok(Json(validation))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let (query, unit) = require_location(&state, &params).await?;
    let answer = state.service.summary(&query, unit).await?;

    Ok(Json(SummaryResponse {
        answer,
        generated_at: Utc::now(),
    }))
}

pub async fn get_recommendations(
    State(state): State<AppState>,
    Query(params): Query<LocationParams>,
) -> Result<Json<RecommendationsResponse>, ApiError> {
    let (query, unit) = require_location(&state, &params).await?;
    let answer = state.service.recommendations(&query, unit).await?;

    Ok(Json(RecommendationsResponse {
        answer,
        generated_at: Utc::now(),
    }))
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let (query, unit) = resolve_location(&state, &request.location).await?;
    let reply = state.service.chat(&request.message, query.as_ref(), unit).await?;
    Ok(Json(reply))
}

pub async fn event_advice(
    State(state): State<AppState>,
    Json(request): Json<EventAdviceRequest>,
) -> Result<Json<EventPlan>, ApiError> {
    let (query, unit) = require_location(&state, &request.location).await?;
    let plan = state
        .service
        .plan_event(&request.title, request.date, &query, unit)
        .await?;
    Ok(Json(plan))
}

pub async fn get_user_value(
    State(state): State<AppState>,
    Path((user_id, key)): Path<(Uuid, String)>,
) -> Result<Json<StoredValueResponse>, ApiError> {
    let key: StoreKey = key.parse().map_err(|e| store_error(&e))?;
    let blob = state.store.get(user_id, key).await.map_err(|e| store_error(&e))?;
    let value = blob.json().map_err(|e| store_error(&e))?;

    Ok(Json(StoredValueResponse {
        user_id: blob.user_id,
        key: blob.key,
        value,
        updated_at: blob.updated_at,
    }))
}

pub async fn put_user_value(
    State(state): State<AppState>,
    Path((user_id, key)): Path<(Uuid, String)>,
    Json(value): Json<serde_json::Value>,
) -> Result<Json<StoredValueResponse>, ApiError> {
    let key: StoreKey = key.parse().map_err(|e| store_error(&e))?;
    let blob = state.store.put(user_id, key, &value).await.map_err(|e| store_error(&e))?;

    Ok(Json(StoredValueResponse {
        user_id: blob.user_id,
        key: blob.key,
        value,
        updated_at: blob.updated_at,
    }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/weather", get(get_weather))
        .route("/weather/refresh", post(refresh_weather))
        .route("/forecast/daily", get(get_daily_forecast))
        .route("/cities/validate", get(validate_city))
        .route("/assistant/summary", get(get_summary))
        .route("/assistant/recommendations", get(get_recommendations))
        .route("/assistant/chat", post(chat))
        .route("/events/advice", post(event_advice))
        .route("/users/:user_id/store/:key", get(get_user_value).put(put_user_value))
        .with_state(state)
}
