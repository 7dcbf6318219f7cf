use crate::ai::{self, AiError, TextGenerator, WeatherContext};
use crate::config::Config;
use crate::forecast::aggregate::{build_daily, build_hourly};
use crate::forecast::openweather::OpenWeatherError;
use crate::forecast::types::*;
use crate::forecast::{LocationQuery, WeatherSource};
use crate::freshness::{Clock, DataClass, FetchError, FreshnessGate, FreshnessPolicy, Gated, GateFailure, SystemClock};
use crate::store::StoreError;
use crate::utils;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use moka::future::Cache;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const RECOMMENDATIONS_KIND: &str = "recommendations";
const CITY_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_CHAT_LEN: usize = 500;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Weather service unavailable: {0}")]
    Upstream(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<&OpenWeatherError> for ServiceError {
    fn from(e: &OpenWeatherError) -> Self {
        match e {
            OpenWeatherError::NotFound(msg) => ServiceError::NotFound(msg.clone()),
            OpenWeatherError::InvalidCoordinates => ServiceError::Validation("Invalid coordinates".to_string()),
            other => ServiceError::Upstream(other.to_string()),
        }
    }
}

impl From<FetchError<OpenWeatherError>> for ServiceError {
    fn from(e: FetchError<OpenWeatherError>) -> Self {
        match e {
            FetchError::Source(inner) => inner.as_ref().into(),
            FetchError::TimedOut(after) => ServiceError::Upstream(format!("fetch timed out after {:?}", after)),
        }
    }
}

/// AI-derived content with where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct AiAnswer<T> {
    pub content: T,
    pub cached: bool,
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityValidation {
    pub city: String,
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub id: Uuid,
    pub reply: String,
    pub weather_related: bool,
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventPlan {
    pub title: String,
    pub date: NaiveDate,
    pub location: String,
    pub forecast: Option<DailyForecast>,
    pub advice: AiAnswer<String>,
}

pub struct WeatherService {
    source: Arc<dyn WeatherSource>,
    ai: Arc<dyn TextGenerator>,
    weather_gate: FreshnessGate<WeatherReport, OpenWeatherError>,
    text_gate: FreshnessGate<String, AiError>,
    list_gate: FreshnessGate<Vec<String>, AiError>,
    city_cache: Cache<String, bool>,
    clock: Arc<dyn Clock>,
    hourly_limit: usize,
    classify_timeout: Duration,
    app_timezone: chrono_tz::Tz,
}

impl WeatherService {
    pub fn new(
        config: &Config,
        source: Arc<dyn WeatherSource>,
        ai: Arc<dyn TextGenerator>,
    ) -> Result<Self, ServiceError> {
        Self::with_clock(config, source, ai, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &Config,
        source: Arc<dyn WeatherSource>,
        ai: Arc<dyn TextGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServiceError> {
        let app_timezone = utils::parse_timezone(&config.app_timezone).map_err(ServiceError::Validation)?;

        // A weather fetch may spend every retry attempt plus the delays between them
        let attempts = config.retry_attempts.max(1);
        let weather_timeout = Duration::from_secs(config.weather_timeout_secs) * attempts
            + config.retry_delay() * attempts;
        let ai_timeout = Duration::from_secs(config.ai_timeout_secs) + Duration::from_secs(1);

        let weather_policy = FreshnessPolicy {
            weather: config.weather_window(),
            fetch_timeout: weather_timeout,
            ..FreshnessPolicy::default()
        };
        let ai_policy = FreshnessPolicy {
            ai_default: config.ai_short_window(),
            ai_windows: HashMap::from([(RECOMMENDATIONS_KIND.to_string(), config.ai_detail_window())]),
            fetch_timeout: ai_timeout,
            ..FreshnessPolicy::default()
        };

        Ok(Self {
            source,
            ai,
            weather_gate: FreshnessGate::with_clock(weather_policy, clock.clone()),
            text_gate: FreshnessGate::with_clock(ai_policy.clone(), clock.clone()),
            list_gate: FreshnessGate::with_clock(ai_policy, clock.clone()),
            city_cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(CITY_CACHE_TTL)
                .build(),
            hourly_limit: config.hourly_limit,
            classify_timeout: Duration::from_secs(config.classify_timeout_secs),
            app_timezone,
            clock,
        })
    }

    fn report_scope(query: &LocationQuery, unit: TemperatureUnit) -> String {
        format!("{}|{}", query.scope(), unit)
    }

    pub async fn report(
        &self,
        query: &LocationQuery,
        unit: TemperatureUnit,
        force: bool,
    ) -> Result<Gated<WeatherReport>, ServiceError> {
        let scope = Self::report_scope(query, unit);
        let fetch = || async {
            let now = self.clock.now();
            let mut report = fetch_report(self.source.as_ref(), query, unit, self.hourly_limit, now).await?;
            if let Some(previous) = self.weather_gate.cached(&DataClass::Weather, &scope) {
                fill_missing(&mut report, previous, now);
            }
            Ok::<_, OpenWeatherError>(report)
        };

        let result = if force {
            self.weather_gate.force_refresh(&DataClass::Weather, &scope, fetch).await
        } else {
            self.weather_gate.get_or_fetch(&DataClass::Weather, &scope, fetch).await
        };

        match result {
            Ok(mut gated) => {
                gated.payload.fetched_at = gated.fetched_at;
                Ok(gated)
            }
            Err(GateFailure {
                error,
                fallback: Some(mut stale),
            }) => {
                tracing::warn!("Serving saved weather for {}: {}", query, error);
                stale.payload.fetched_at = stale.fetched_at;
                stale.payload.warning = Some(format!(
                    "Showing weather saved at {} because the refresh failed: {}",
                    stale.fetched_at.format("%Y-%m-%d %H:%M UTC"),
                    error
                ));
                Ok(stale)
            }
            Err(GateFailure { error, fallback: None }) => {
                tracing::error!("Weather for {} unavailable: {}", query, error);
                Err(error.into())
            }
        }
    }

    /// Existence check, remembered for a day.
    pub async fn validate_city(&self, city: &str) -> Result<CityValidation, ServiceError> {
        let normalized = utils::validate_city_name(city).map_err(ServiceError::Validation)?;
        let key = LocationQuery::City(normalized.clone()).scope();
        let source = self.source.clone();
        let lookup = normalized.clone();

        let valid = self
            .city_cache
            .try_get_with(key, async move { source.city_exists(&lookup).await })
            .await
            .map_err(|e| ServiceError::Upstream(e.to_string()))?;

        Ok(CityValidation {
            city: normalized,
            valid,
        })
    }

    pub async fn summary(
        &self,
        query: &LocationQuery,
        unit: TemperatureUnit,
    ) -> Result<AiAnswer<String>, ServiceError> {
        let report = self.report(query, unit, false).await?.payload;
        let context = WeatherContext::from_report(&report);
        let scope = Self::report_scope(query, unit);
        let ai = self.ai.as_ref();

        let result = self
            .text_gate
            .get_or_fetch(&DataClass::ai("summary"), &scope, || ai::weather_summary(ai, &context))
            .await;
        Ok(answer_or_fallback(result, || ai::FALLBACK_SUMMARY.to_string()))
    }

    pub async fn recommendations(
        &self,
        query: &LocationQuery,
        unit: TemperatureUnit,
    ) -> Result<AiAnswer<Vec<String>>, ServiceError> {
        let report = self.report(query, unit, false).await?.payload;
        let context = WeatherContext::from_report(&report);
        let scope = Self::report_scope(query, unit);
        let ai = self.ai.as_ref();

        let result = self
            .list_gate
            .get_or_fetch(&DataClass::ai(RECOMMENDATIONS_KIND), &scope, || {
                ai::recommendations(ai, &context)
            })
            .await;
        Ok(answer_or_fallback(result, ai::fallback_recommendations))
    }

    pub async fn chat(
        &self,
        message: &str,
        query: Option<&LocationQuery>,
        unit: TemperatureUnit,
    ) -> Result<ChatReply, ServiceError> {
        let question = utils::sanitize_string(message, MAX_CHAT_LEN);
        if question.is_empty() {
            return Err(ServiceError::Validation("Message is empty".to_string()));
        }

        let weather_related =
            match ai::classify_weather_question(self.ai.as_ref(), &question, self.classify_timeout).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    tracing::warn!("Question classification failed, using keywords: {}", e);
                    ai::looks_weather_related(&question)
                }
            };
        if !weather_related {
            return Ok(ChatReply {
                id: Uuid::new_v4(),
                reply: ai::OFF_TOPIC_REPLY.to_string(),
                weather_related,
                fallback: false,
            });
        }

        let context = match query {
            Some(query) => match self.report(query, unit, false).await {
                Ok(gated) => WeatherContext::from_report(&gated.payload),
                Err(e) => {
                    tracing::warn!("Answering without weather data: {}", e);
                    empty_context(&query.to_string(), unit)
                }
            },
            None => empty_context("unknown", unit),
        };

        let (reply, fallback) = match ai::chat_reply(self.ai.as_ref(), &question, &context).await {
            Ok(reply) => (reply, false),
            Err(e) => {
                tracing::error!("Chat reply failed: {}", e);
                (ai::FALLBACK_CHAT.to_string(), true)
            }
        };

        Ok(ChatReply {
            id: Uuid::new_v4(),
            reply,
            weather_related,
            fallback,
        })
    }

    pub async fn plan_event(
        &self,
        title: &str,
        date: Option<NaiveDate>,
        query: &LocationQuery,
        unit: TemperatureUnit,
    ) -> Result<EventPlan, ServiceError> {
        let title = utils::sanitize_string(title, 120);
        if title.is_empty() {
            return Err(ServiceError::Validation("Event title is empty".to_string()));
        }
        let date = date.unwrap_or_else(|| self.clock.now().with_timezone(&self.app_timezone).date_naive());

        let report = self.report(query, unit, false).await?.payload;
        let forecast = report.daily.iter().find(|d| d.date == date).cloned();
        let context = WeatherContext::from_report(&report);
        let scope = format!(
            "{}|{}|{}",
            Self::report_scope(query, unit),
            date,
            title.to_lowercase()
        );
        let ai = self.ai.as_ref();

        let result = self
            .text_gate
            .get_or_fetch(&DataClass::ai("event"), &scope, || {
                ai::event_advice(ai, &title, forecast.as_ref(), &context)
            })
            .await;

        Ok(EventPlan {
            title,
            date,
            location: report.location,
            forecast,
            advice: answer_or_fallback(result, || ai::FALLBACK_EVENT_ADVICE.to_string()),
        })
    }
}

/// Fetch current conditions and the 3-hour forecast together and aggregate.
///
/// One side failing still yields a report with a warning; both failing is an error.
pub async fn fetch_report(
    source: &dyn WeatherSource,
    query: &LocationQuery,
    unit: TemperatureUnit,
    hourly_limit: usize,
    now: DateTime<Utc>,
) -> Result<WeatherReport, OpenWeatherError> {
    let (current, forecast) = tokio::join!(source.current(query), source.forecast3h(query));

    let (current, forecast, warning) = match (current, forecast) {
        (Ok(current), Ok(forecast)) => (Some(current), Some(forecast), None),
        (Ok(current), Err(e)) => {
            tracing::warn!("Forecast for {} failed, returning current only: {}", query, e);
            (Some(current), None, Some(format!("Forecast unavailable: {}", e)))
        }
        (Err(e), Ok(forecast)) => {
            tracing::warn!("Current weather for {} failed, returning forecast only: {}", query, e);
            (None, Some(forecast), Some(format!("Current conditions unavailable: {}", e)))
        }
        (Err(current_err), Err(forecast_err)) => {
            tracing::error!("Weather for {} failed: {} / {}", query, current_err, forecast_err);
            return Err(current_err);
        }
    };

    let utc_offset_secs = forecast
        .as_ref()
        .map(|f| f.city.timezone)
        .or_else(|| current.as_ref().map(|c| c.timezone))
        .unwrap_or(0);
    let tz = FixedOffset::east_opt(utc_offset_secs).unwrap_or_else(|| Utc.fix());

    let samples: Vec<IntervalSample> = forecast
        .as_ref()
        .map(|f| {
            f.list
                .iter()
                .map(|item| IntervalSample::from_forecast3h_item(item, unit))
                .collect()
        })
        .unwrap_or_default();

    let location = match (&forecast, &current) {
        (Some(f), _) if !f.city.name.is_empty() => join_place(&f.city.name, &f.city.country),
        (_, Some(c)) if !c.name.is_empty() => {
            let country = c.sys.as_ref().and_then(|s| s.country.clone()).unwrap_or_default();
            join_place(&c.name, &country)
        }
        _ => query.to_string(),
    };

    Ok(WeatherReport {
        location,
        unit,
        utc_offset_secs,
        current: current.as_ref().map(|c| CurrentConditions::from_current(c, unit)),
        daily: build_daily(&samples, &tz),
        hourly: build_hourly(&samples, now.timestamp(), hourly_limit),
        warning,
        fetched_at: now,
    })
}

/// Complete a partial report with the side that failed from the previous
/// record, so a flaky feed never replaces good data with nothing.
fn fill_missing(report: &mut WeatherReport, previous: Gated<WeatherReport>, now: DateTime<Utc>) {
    if report.warning.is_none() {
        return;
    }
    let saved_at = previous.fetched_at.format("%Y-%m-%d %H:%M UTC").to_string();
    let previous = previous.payload;

    if report.current.is_none() && previous.current.is_some() {
        report.current = previous.current;
    }
    if report.daily.is_empty() && !previous.daily.is_empty() {
        let today = FixedOffset::east_opt(previous.utc_offset_secs)
            .map(|tz| now.with_timezone(&tz).date_naive())
            .unwrap_or_else(|| now.date_naive());
        let now_ts = now.timestamp();

        report.utc_offset_secs = previous.utc_offset_secs;
        report.daily = previous.daily.into_iter().filter(|d| d.date >= today).collect();
        report.hourly = previous
            .hourly
            .into_iter()
            .filter(|h| h.ts + 3 * 3600 > now_ts)
            .collect();
    }

    if let Some(warning) = report.warning.as_mut() {
        warning.push_str(&format!(" (showing data saved at {})", saved_at));
    }
}

fn join_place(name: &str, country: &str) -> String {
    if country.is_empty() {
        name.to_string()
    } else {
        format!("{}, {}", name, country)
    }
}

fn empty_context(location: &str, unit: TemperatureUnit) -> WeatherContext {
    WeatherContext {
        location: location.to_string(),
        unit: unit.symbol().to_string(),
        current_temp: None,
        feels_like: None,
        condition: None,
        humidity: None,
        wind_speed_ms: None,
        today_min: None,
        today_max: None,
        rain_chance_pct: None,
        upcoming: Vec::new(),
    }
}

fn answer_or_fallback<T, E: std::fmt::Display>(
    result: Result<Gated<T>, GateFailure<T, E>>,
    canned: impl FnOnce() -> T,
) -> AiAnswer<T> {
    match result {
        Ok(gated) => AiAnswer {
            content: gated.payload,
            cached: gated.from_cache,
            fallback: false,
        },
        Err(GateFailure { error, fallback }) => {
            tracing::warn!("AI generation failed: {}", error);
            match fallback {
                Some(stale) => AiAnswer {
                    content: stale.payload,
                    cached: true,
                    fallback: true,
                },
                None => AiAnswer {
                    content: canned(),
                    cached: false,
                    fallback: true,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockAiClient;
    use crate::forecast::mock::MockWeatherClient;
    use crate::freshness::tests::ManualClock;
    use crate::freshness::Freshness;

    struct Fixture {
        clock: Arc<ManualClock>,
        weather: Arc<MockWeatherClient>,
        ai: Arc<MockAiClient>,
        service: WeatherService,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let weather = Arc::new(MockWeatherClient::new());
        let ai = Arc::new(MockAiClient::new());
        let service = WeatherService::with_clock(
            &Config::default(),
            weather.clone(),
            ai.clone(),
            clock.clone(),
        )
        .unwrap();
        Fixture {
            clock,
            weather,
            ai,
            service,
        }
    }

    fn london() -> LocationQuery {
        LocationQuery::City("London, GB".to_string())
    }

    #[tokio::test]
    async fn test_report_aggregates_forecast() {
        let f = fixture();

        let gated = f.service.report(&london(), TemperatureUnit::Celsius, false).await.unwrap();
        let report = gated.payload;

        assert!(!gated.from_cache);
        assert_eq!(report.location, "London, GB");
        assert!(report.current.is_some());
        assert!(report.warning.is_none());
        assert!((5..=6).contains(&report.daily.len()));
        assert_eq!(report.hourly.len(), 8);
        assert!(report.daily.iter().all(|d| d.temp_min <= d.temp_max));
    }

    #[tokio::test]
    async fn test_repeated_requests_hit_cache_until_stale() {
        let f = fixture();
        let unit = TemperatureUnit::Celsius;

        f.service.report(&london(), unit, false).await.unwrap();
        let second = f.service.report(&london(), unit, false).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(f.weather.forecast_calls(), 1);

        f.clock.advance(chrono::Duration::minutes(6));
        let third = f.service.report(&london(), unit, false).await.unwrap();
        assert!(!third.from_cache);
        assert_eq!(f.weather.forecast_calls(), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_fetches_while_fresh() {
        let f = fixture();
        let unit = TemperatureUnit::Celsius;
        f.service.report(&london(), unit, false).await.unwrap();

        let forced = f.service.report(&london(), unit, true).await.unwrap();

        assert!(!forced.from_cache);
        assert_eq!(f.weather.forecast_calls(), 2);
    }

    #[tokio::test]
    async fn test_partial_success_keeps_current_weather() {
        let f = fixture();
        f.weather.set_fail_forecast(true);

        let report = f
            .service
            .report(&london(), TemperatureUnit::Celsius, false)
            .await
            .unwrap()
            .payload;

        assert!(report.current.is_some());
        assert!(report.daily.is_empty());
        assert!(report.warning.unwrap().starts_with("Forecast unavailable"));
    }

    #[tokio::test]
    async fn test_stale_report_served_when_refresh_fails() {
        let f = fixture();
        let unit = TemperatureUnit::Celsius;
        let first = f.service.report(&london(), unit, false).await.unwrap();
        f.clock.advance(chrono::Duration::minutes(10));
        f.weather.set_fail_current(true);
        f.weather.set_fail_forecast(true);

        let served = f.service.report(&london(), unit, false).await.unwrap();

        assert!(served.from_cache);
        assert_eq!(served.fetched_at, first.fetched_at);
        assert!(served.payload.warning.is_some());
        assert_eq!(served.payload.daily, first.payload.daily);
    }

    #[tokio::test]
    async fn test_partial_refetch_keeps_saved_forecast() {
        let f = fixture();
        let unit = TemperatureUnit::Celsius;
        let first = f.service.report(&london(), unit, false).await.unwrap();
        f.clock.advance(chrono::Duration::minutes(6));
        f.weather.set_fail_forecast(true);

        let partial = f.service.report(&london(), unit, false).await.unwrap();

        assert!(!partial.from_cache);
        assert!(partial.payload.current.is_some());
        assert!(!partial.payload.daily.is_empty());
        assert!(!partial.payload.hourly.is_empty());
        assert_eq!(partial.payload.daily[0].date, first.payload.daily[0].date);
        let warning = partial.payload.warning.unwrap();
        assert!(warning.starts_with("Forecast unavailable"));
        assert!(warning.contains("showing data saved at"));

        f.weather.set_fail_forecast(false);
        f.clock.advance(chrono::Duration::minutes(1));
        let cached = f.service.report(&london(), unit, false).await.unwrap();
        assert!(cached.from_cache);
        assert!(!cached.payload.daily.is_empty());

        f.clock.advance(chrono::Duration::minutes(6));
        let healed = f.service.report(&london(), unit, false).await.unwrap();
        assert!(!healed.from_cache);
        assert!(healed.payload.warning.is_none());
        assert!(!healed.payload.daily.is_empty());
    }

    #[tokio::test]
    async fn test_report_follows_service_clock() {
        let f = fixture();
        f.clock.advance(chrono::Duration::hours(6));
        let now_ts = f.clock.now().timestamp();

        let gated = f.service.report(&london(), TemperatureUnit::Celsius, false).await.unwrap();

        assert_eq!(gated.payload.fetched_at, gated.fetched_at);
        assert_eq!(gated.fetched_at, f.clock.now());
        assert_eq!(gated.payload.hourly.len(), 8);
        assert!(gated.payload.hourly.iter().all(|h| h.ts + 3 * 3600 > now_ts));

        f.clock.advance(chrono::Duration::minutes(2));
        let cached = f.service.report(&london(), TemperatureUnit::Celsius, false).await.unwrap();
        assert!(cached.from_cache);
        assert_eq!(cached.payload.fetched_at, gated.fetched_at);
    }

    #[tokio::test]
    async fn test_unknown_city_is_not_found() {
        let f = fixture();

        let result = f
            .service
            .report(&LocationQuery::City("Atlantis".to_string()), TemperatureUnit::Celsius, false)
            .await;

        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_validate_city() {
        let f = fixture();

        let tokyo = f.service.validate_city("  tokyo ,  jp").await.unwrap();
        assert_eq!(tokyo.city, "tokyo, JP");
        assert!(tokyo.valid);
        assert!(!f.service.validate_city("Atlantis, XX").await.unwrap().valid);
        assert!(matches!(
            f.service.validate_city("   ").await,
            Err(ServiceError::Validation(_))
        ));
        assert_eq!(f.weather.current_calls(), 0);
    }

    #[tokio::test]
    async fn test_summary_falls_back_without_caching_canned_text() {
        let f = fixture();
        f.ai.set_failing(true);

        let answer = f.service.summary(&london(), TemperatureUnit::Celsius).await.unwrap();
        assert!(answer.fallback);
        assert_eq!(answer.content, ai::FALLBACK_SUMMARY);

        f.ai.set_failing(false);
        let answer = f.service.summary(&london(), TemperatureUnit::Celsius).await.unwrap();
        assert!(!answer.fallback);
        assert!(!answer.cached);
        assert_ne!(answer.content, ai::FALLBACK_SUMMARY);
    }

    #[tokio::test]
    async fn test_ai_windows_differ_by_kind() {
        let f = fixture();
        let unit = TemperatureUnit::Celsius;
        let scope = WeatherService::report_scope(&london(), unit);
        f.service.summary(&london(), unit).await.unwrap();
        f.service.recommendations(&london(), unit).await.unwrap();

        f.clock.advance(chrono::Duration::minutes(90));

        assert_eq!(f.service.text_gate.status(&DataClass::ai("summary"), &scope), Freshness::Stale);
        assert_eq!(
            f.service.list_gate.status(&DataClass::ai(RECOMMENDATIONS_KIND), &scope),
            Freshness::Fresh
        );
    }

    #[tokio::test]
    async fn test_chat_redirects_off_topic_questions() {
        let f = fixture();

        let reply = f
            .service
            .chat("Who wrote Hamlet?", None, TemperatureUnit::Celsius)
            .await
            .unwrap();

        assert!(!reply.weather_related);
        assert_eq!(reply.reply, ai::OFF_TOPIC_REPLY);
        assert_eq!(f.ai.calls(), 1);
    }

    #[tokio::test]
    async fn test_chat_never_blank_when_ai_fails() {
        let f = fixture();
        f.ai.set_failing(true);

        let reply = f
            .service
            .chat("Do I need an umbrella?", Some(&london()), TemperatureUnit::Celsius)
            .await
            .unwrap();

        // Classification fell back to keywords
        assert!(reply.weather_related);
        assert!(reply.fallback);
        assert_eq!(reply.reply, ai::FALLBACK_CHAT);
    }

    #[tokio::test]
    async fn test_plan_event_outside_forecast_range() {
        let f = fixture();
        let far = Utc::now().date_naive() + chrono::Duration::days(30);

        let plan = f
            .service
            .plan_event("Picnic", Some(far), &london(), TemperatureUnit::Celsius)
            .await
            .unwrap();

        assert!(plan.forecast.is_none());
        assert!(!plan.advice.content.is_empty());
    }

    #[tokio::test]
    async fn test_plan_event_within_range() {
        let f = fixture();
        let report = f
            .service
            .report(&london(), TemperatureUnit::Celsius, false)
            .await
            .unwrap()
            .payload;
        let date = report.daily[1].date;

        let plan = f
            .service
            .plan_event("Garden party", Some(date), &london(), TemperatureUnit::Celsius)
            .await
            .unwrap();

        assert_eq!(plan.forecast.unwrap().date, date);
        assert!(!plan.advice.fallback);
    }
}
