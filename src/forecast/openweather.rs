use super::types::*;
use super::{LocationQuery, WeatherSource};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Error, Debug)]
pub enum OpenWeatherError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("Rate limited, retry after: {0}s")]
    RateLimited(u64),
    #[error("Location not found: {0}")]
    NotFound(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Invalid coordinates")]
    InvalidCoordinates,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            delay: config.retry_delay(),
        }
    }
}

pub struct OpenWeatherClient {
    client: Client,
    config: Config,
    retry: RetryPolicy,
}

impl OpenWeatherClient {
    pub fn new(config: Config) -> Result<Self, OpenWeatherError> {
        let client = Client::builder()
            .user_agent("Skylar/1.0")
            .timeout(Duration::from_secs(config.weather_timeout_secs))
            .build()?;
        let retry = RetryPolicy::from_config(&config);

        Ok(Self {
            client,
            config,
            retry,
        })
    }

    pub async fn get_current(
        &self,
        query: &LocationQuery,
    ) -> Result<CurrentWeatherResponse, OpenWeatherError> {
        let url = format!(
            "{}{}",
            self.config.openweather_base_url, self.config.openweather_current_path
        );
        let response = self.make_request_with_retry(&url, &self.query_params(query)?).await?;

        let current: CurrentWeatherResponse = serde_json::from_value(response)?;
        Ok(current)
    }

    pub async fn get_forecast3h(
        &self,
        query: &LocationQuery,
    ) -> Result<Forecast3hResponse, OpenWeatherError> {
        let url = format!(
            "{}{}",
            self.config.openweather_base_url, self.config.openweather_forecast3h_path
        );
        let response = self.make_request_with_retry(&url, &self.query_params(query)?).await?;

        let forecast: Forecast3hResponse = serde_json::from_value(response)?;
        Ok(forecast)
    }

    /// Existence check against the current-weather endpoint.
    pub async fn city_exists(&self, city: &str) -> Result<bool, OpenWeatherError> {
        match self.get_current(&LocationQuery::City(city.to_string())).await {
            Ok(_) => Ok(true),
            Err(OpenWeatherError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // Temperatures come back in Kelvin; no `units` parameter is sent.
    fn query_params(&self, query: &LocationQuery) -> Result<Vec<(String, String)>, OpenWeatherError> {
        let mut params = match query {
            LocationQuery::City(city) => vec![("q".to_string(), city.clone())],
            LocationQuery::Coordinates { lat, lon } => {
                if !crate::utils::is_valid_coordinates(*lat, *lon) {
                    return Err(OpenWeatherError::InvalidCoordinates);
                }
                vec![
                    ("lat".to_string(), lat.to_string()),
                    ("lon".to_string(), lon.to_string()),
                ]
            }
        };
        params.push(("appid".to_string(), self.config.openweather_api_key.clone()));
        Ok(params)
    }

    async fn make_request_with_retry(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<Value, OpenWeatherError> {
        let mut attempt = 1;

        loop {
            let result = self.client.get(url).query(params).send().await;

            let retryable = match result {
                Ok(response) => match response.status() {
                    StatusCode::OK => {
                        let json: Value = response.json().await?;
                        return Ok(json);
                    }
                    StatusCode::NOT_FOUND => {
                        return Err(OpenWeatherError::NotFound(
                            response.text().await.unwrap_or_default(),
                        ));
                    }
                    StatusCode::TOO_MANY_REQUESTS => {
                        OpenWeatherError::RateLimited(self.retry.delay.as_secs())
                    }
                    status if status.is_server_error() => {
                        let error_text = response.text().await.unwrap_or_default();
                        OpenWeatherError::ApiError(format!("HTTP {}: {}", status, error_text))
                    }
                    status => {
                        let error_text = response.text().await.unwrap_or_default();
                        return Err(OpenWeatherError::ApiError(format!(
                            "HTTP {}: {}",
                            status, error_text
                        )));
                    }
                },
                Err(e) if e.is_timeout() || e.is_connect() => OpenWeatherError::RequestFailed(e),
                Err(e) => return Err(OpenWeatherError::RequestFailed(e)),
            };

            if attempt >= self.retry.attempts {
                tracing::error!("Weather request failed after {} attempts: {}", attempt, retryable);
                return Err(retryable);
            }

            // Rate limiting gets jitter on top of the fixed delay
            let delay = match retryable {
                OpenWeatherError::RateLimited(_) => self.retry.delay.mul_f32(1.0 + fastrand::f32() * 0.5),
                _ => self.retry.delay,
            };
            tracing::warn!(
                "Weather request attempt {} of {} failed ({}), retrying in {}ms",
                attempt,
                self.retry.attempts,
                retryable,
                delay.as_millis()
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn current(&self, query: &LocationQuery) -> Result<CurrentWeatherResponse, OpenWeatherError> {
        self.get_current(query).await
    }

    async fn forecast3h(&self, query: &LocationQuery) -> Result<Forecast3hResponse, OpenWeatherError> {
        self.get_forecast3h(query).await
    }

    async fn city_exists(&self, city: &str) -> Result<bool, OpenWeatherError> {
        OpenWeatherClient::city_exists(self, city).await
    }
}

// Convert weather source payloads to internal format
impl IntervalSample {
    pub fn from_forecast3h_item(item: &Forecast3hItem, unit: TemperatureUnit) -> Self {
        Self {
            ts: item.dt,
            temp: unit.from_kelvin(item.main.temp),
            temp_min: unit.from_kelvin(item.main.temp_min),
            temp_max: unit.from_kelvin(item.main.temp_max),
            feels_like: unit.from_kelvin(item.main.feels_like),
            humidity: item.main.humidity,
            pressure: item.main.pressure,
            wind_speed: item.wind.speed,
            wind_deg: item.wind.deg,
            cloud_pct: item.clouds.all,
            pop: item.pop,
            condition: WeatherCondition::from_entries(&item.weather),
        }
    }
}

impl CurrentConditions {
    pub fn from_current(current: &CurrentWeatherResponse, unit: TemperatureUnit) -> Self {
        Self {
            ts: current.dt,
            location_name: current.name.clone(),
            country: current.sys.as_ref().and_then(|s| s.country.clone()),
            temp: unit.from_kelvin(current.main.temp),
            feels_like: unit.from_kelvin(current.main.feels_like),
            temp_min: unit.from_kelvin(current.main.temp_min),
            temp_max: unit.from_kelvin(current.main.temp_max),
            humidity: current.main.humidity,
            pressure: current.main.pressure,
            wind_speed: current.wind.speed,
            wind_deg: current.wind.deg,
            cloud_pct: current.clouds.all,
            utc_offset_secs: current.timezone,
            condition: WeatherCondition::from_entries(&current.weather),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenWeatherClient {
        let config = Config {
            openweather_base_url: server.uri(),
            openweather_api_key: "test-key".to_string(),
            retry_attempts: 2,
            retry_delay_ms: 0,
            ..Config::default()
        };
        OpenWeatherClient::new(config).unwrap()
    }

    fn current_body() -> Value {
        json!({
            "coord": { "lat": 51.51, "lon": -0.13 },
            "weather": [{ "id": 800, "main": "Clear", "description": "clear sky", "icon": "01d" }],
            "main": {
                "temp": 293.15, "feels_like": 292.0, "temp_min": 290.15,
                "temp_max": 295.15, "pressure": 1012.0, "humidity": 55.0
            },
            "wind": { "speed": 4.1, "deg": 250.0 },
            "clouds": { "all": 5.0 },
            "dt": 1717243200,
            "timezone": 3600,
            "name": "London",
            "sys": { "country": "GB" }
        })
    }

    #[tokio::test]
    async fn test_current_converts_kelvin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "London, GB"))
            .and(query_param("appid", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let current = client
            .get_current(&LocationQuery::City("London, GB".to_string()))
            .await
            .unwrap();
        let conditions = CurrentConditions::from_current(&current, TemperatureUnit::Celsius);

        assert!((conditions.temp - 20.0).abs() < 1e-9);
        assert_eq!(conditions.country.as_deref(), Some("GB"));
        assert_eq!(conditions.utc_offset_secs, 3600);
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .get_current(&LocationQuery::City("London, GB".to_string()))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .get_forecast3h(&LocationQuery::Coordinates { lat: 1.0, lon: 2.0 })
            .await;

        assert!(matches!(result, Err(OpenWeatherError::ApiError(_))));
    }

    #[tokio::test]
    async fn test_city_exists_maps_not_found_to_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "cod": "404", "message": "city not found" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);

        assert!(!client.city_exists("Atlantis, XX").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_invalid_coordinates_before_network() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        let result = client
            .get_current(&LocationQuery::Coordinates { lat: 95.0, lon: 0.0 })
            .await;

        assert!(matches!(result, Err(OpenWeatherError::InvalidCoordinates)));
    }

    #[test]
    fn test_forecast_item_mapping() {
        let item: Forecast3hItem = serde_json::from_value(json!({
            "dt": 1717243200,
            "main": {
                "temp": 273.15, "feels_like": 270.0, "temp_min": 272.15,
                "temp_max": 274.15, "pressure": 1000.0, "humidity": 80.0
            },
            "weather": [{ "id": 500, "main": "Rain", "description": "light rain", "icon": "10d" }],
            "clouds": { "all": 90.0 },
            "wind": { "speed": 6.0, "deg": 10.0, "gust": 9.0 },
            "pop": 0.7,
            "rain": { "3h": 1.2 },
            "dt_txt": "2024-06-01 12:00:00"
        }))
        .unwrap();

        let sample = IntervalSample::from_forecast3h_item(&item, TemperatureUnit::Fahrenheit);

        assert!((sample.temp - 32.0).abs() < 1e-9);
        assert_eq!(sample.condition.icon_prefix(), "10");
        assert_eq!(sample.pop, 0.7);
    }
}
