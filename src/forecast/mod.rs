pub mod aggregate;
pub mod bucket;
pub mod mock;
pub mod openweather;
pub mod reconcile;
pub mod types;

use async_trait::async_trait;
use openweather::OpenWeatherError;
use serde::{Deserialize, Serialize};
use std::fmt;
use types::*;

/// Where to fetch weather for: a `"City, CountryCode"` name or a coordinate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocationQuery {
    City(String),
    Coordinates { lat: f64, lon: f64 },
}

impl LocationQuery {
    /// Stable cache scope: case and spacing of city names do not matter.
    pub fn scope(&self) -> String {
        match self {
            LocationQuery::City(city) => city
                .split(',')
                .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
                .join(",")
                .to_lowercase(),
            LocationQuery::Coordinates { lat, lon } => format!("{:.3},{:.3}", lat, lon),
        }
    }
}

impl fmt::Display for LocationQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationQuery::City(city) => f.write_str(city),
            LocationQuery::Coordinates { lat, lon } => write!(f, "{:.4},{:.4}", lat, lon),
        }
    }
}

#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self, query: &LocationQuery) -> Result<CurrentWeatherResponse, OpenWeatherError>;

    async fn forecast3h(&self, query: &LocationQuery) -> Result<Forecast3hResponse, OpenWeatherError>;

    async fn city_exists(&self, city: &str) -> Result<bool, OpenWeatherError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_normalizes_city_names() {
        let a = LocationQuery::City("  New   York , US".to_string());
        let b = LocationQuery::City("new york,us".to_string());

        assert_eq!(a.scope(), b.scope());
        assert_eq!(a.scope(), "new york,us");
    }
}
