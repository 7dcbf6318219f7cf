use super::openweather::OpenWeatherError;
use super::types::*;
use super::{LocationQuery, WeatherSource};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const KNOWN_CITIES: [(&str, &str, f64, f64, i32); 5] = [
    ("London", "GB", 51.5073, -0.1276, 0),
    ("Jakarta", "ID", -6.2088, 106.8456, 7 * 3600),
    ("New York", "US", 40.7128, -74.0060, -5 * 3600),
    ("Tokyo", "JP", 35.6762, 139.6503, 9 * 3600),
    ("Bangkok", "TH", 13.7563, 100.5018, 7 * 3600),
];

/// Offline weather source with deterministic data and switchable failures.
pub struct MockWeatherClient {
    fail_current: AtomicBool,
    fail_forecast: AtomicBool,
    forecast_calls: AtomicUsize,
    current_calls: AtomicUsize,
}

impl Default for MockWeatherClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWeatherClient {
    pub fn new() -> Self {
        Self {
            fail_current: AtomicBool::new(false),
            fail_forecast: AtomicBool::new(false),
            forecast_calls: AtomicUsize::new(0),
            current_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_current(&self, fail: bool) {
        self.fail_current.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_forecast(&self, fail: bool) {
        self.fail_forecast.store(fail, Ordering::SeqCst);
    }

    pub fn forecast_calls(&self) -> usize {
        self.forecast_calls.load(Ordering::SeqCst)
    }

    pub fn current_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    fn resolve(query: &LocationQuery) -> Result<(String, String, f64, f64, i32), OpenWeatherError> {
        match query {
            LocationQuery::City(city) => {
                let name = city.split(',').next().unwrap_or_default().trim().to_lowercase();
                KNOWN_CITIES
                    .iter()
                    .find(|(known, ..)| known.to_lowercase() == name)
                    .map(|&(n, c, lat, lon, tz)| (n.to_string(), c.to_string(), lat, lon, tz))
                    .ok_or_else(|| OpenWeatherError::NotFound(format!("city not found: {}", city)))
            }
            LocationQuery::Coordinates { lat, lon } => {
                if !crate::utils::is_valid_coordinates(*lat, *lon) {
                    return Err(OpenWeatherError::InvalidCoordinates);
                }
                // Rough solar offset, whole hours
                let tz = ((lon / 15.0).round() as i32) * 3600;
                Ok(("Unknown Location".to_string(), String::new(), *lat, *lon, tz))
            }
        }
    }
}

#[async_trait]
impl WeatherSource for MockWeatherClient {
    async fn current(&self, query: &LocationQuery) -> Result<CurrentWeatherResponse, OpenWeatherError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_current.load(Ordering::SeqCst) {
            return Err(OpenWeatherError::ApiError("HTTP 503: mock outage".to_string()));
        }
        let (name, country, lat, lon, timezone) = Self::resolve(query)?;
        let now = Utc::now().timestamp();
        let base_k = 288.15 + lat.abs().min(60.0) / 10.0;

        Ok(CurrentWeatherResponse {
            coord: Some(Coord { lat, lon }),
            weather: vec![WeatherEntry {
                id: 801,
                main: "Clouds".to_string(),
                description: "few clouds".to_string(),
                icon: "02d".to_string(),
            }],
            main: MainReadings {
                temp: base_k,
                feels_like: base_k - 1.0,
                temp_min: base_k - 2.0,
                temp_max: base_k + 2.0,
                pressure: 1013.0,
                humidity: 62.0,
            },
            wind: Wind {
                speed: 3.4,
                deg: 220.0,
                gust: None,
            },
            clouds: Clouds { all: 20.0 },
            dt: now,
            timezone,
            name,
            sys: Some(CurrentSys {
                country: Some(country),
                sunrise: None,
                sunset: None,
            }),
        })
    }

    async fn forecast3h(&self, query: &LocationQuery) -> Result<Forecast3hResponse, OpenWeatherError> {
        self.forecast_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_forecast.load(Ordering::SeqCst) {
            return Err(OpenWeatherError::ApiError("HTTP 503: mock outage".to_string()));
        }
        let (name, country, lat, lon, timezone) = Self::resolve(query)?;
        let start = (Utc::now().timestamp() / (3 * 3600)) * (3 * 3600);
        let base_k = 288.15 + lat.abs().min(60.0) / 10.0;

        // 5 days of 3-hour data (40 items)
        let list = (0..40)
            .map(|i| {
                let dt = start + i * 3 * 3600;
                let local_hour = ((dt + timezone as i64).rem_euclid(86_400)) / 3600;
                let diurnal = 5.0 * ((local_hour as f64 - 9.0) * std::f64::consts::PI / 12.0).sin();
                let temp = base_k + diurnal;
                let day = if (6..18).contains(&local_hour) { "d" } else { "n" };

                // Every third slot rains; every fifth reports a dry category with a rain icon
                let (id, main, description, icon, pop) = match i % 5 {
                    0 => (800, "Clear", "clear sky", format!("10{}", day), 0.2),
                    _ if i % 3 == 0 => (500, "Rain", "light rain", format!("10{}", day), 0.6),
                    1 | 2 => (800, "Clear", "clear sky", format!("01{}", day), 0.0),
                    _ => (803, "Clouds", "broken clouds", format!("04{}", day), 0.1),
                };

                Forecast3hItem {
                    dt,
                    main: MainReadings {
                        temp,
                        feels_like: temp - 1.0,
                        temp_min: temp - 1.5,
                        temp_max: temp + 1.5,
                        pressure: 1010.0 + (i % 4) as f64,
                        humidity: 55.0 + (i % 7) as f64 * 4.0,
                    },
                    weather: vec![WeatherEntry {
                        id,
                        main: main.to_string(),
                        description: description.to_string(),
                        icon,
                    }],
                    clouds: Clouds {
                        all: if main == "Clear" { 5.0 } else { 75.0 },
                    },
                    wind: Wind {
                        speed: 2.0 + (i % 6) as f64 * 0.5,
                        deg: 180.0,
                        gust: None,
                    },
                    visibility: Some(10000),
                    pop,
                    rain: None,
                    snow: None,
                    dt_txt: None,
                }
            })
            .collect::<Vec<_>>();

        Ok(Forecast3hResponse {
            cnt: list.len() as i32,
            list,
            city: Forecast3hCity {
                id: 0,
                name,
                coord: Coord { lat, lon },
                country,
                timezone,
                sunrise: None,
                sunset: None,
            },
        })
    }

    async fn city_exists(&self, city: &str) -> Result<bool, OpenWeatherError> {
        match Self::resolve(&LocationQuery::City(city.to_string())) {
            Ok(_) => Ok(true),
            Err(OpenWeatherError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_forecast_shape() {
        let client = MockWeatherClient::new();
        let forecast = client
            .forecast3h(&LocationQuery::City("Jakarta, ID".to_string()))
            .await
            .unwrap();

        assert_eq!(forecast.list.len(), 40);
        assert_eq!(forecast.city.timezone, 7 * 3600);
        assert!(forecast.list.windows(2).all(|w| w[1].dt - w[0].dt == 3 * 3600));
        assert_eq!(client.forecast_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_unknown_city() {
        let client = MockWeatherClient::new();

        assert!(client.city_exists("tokyo").await.unwrap());
        assert!(!client.city_exists("Atlantis").await.unwrap());
    }
}
