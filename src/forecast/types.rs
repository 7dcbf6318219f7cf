use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// Weather source wire format

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWeatherResponse {
    pub coord: Option<Coord>,
    pub weather: Vec<WeatherEntry>,
    pub main: MainReadings,
    pub wind: Wind,
    pub clouds: Clouds,
    pub dt: i64,
    #[serde(default)]
    pub timezone: i32,
    #[serde(default)]
    pub name: String,
    pub sys: Option<CurrentSys>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSys {
    pub country: Option<String>,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hResponse {
    #[serde(default)]
    pub cnt: i32,
    pub list: Vec<Forecast3hItem>,
    pub city: Forecast3hCity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hItem {
    pub dt: i64,
    pub main: MainReadings,
    pub weather: Vec<WeatherEntry>,
    pub clouds: Clouds,
    pub wind: Wind,
    pub visibility: Option<i32>,
    #[serde(default)]
    pub pop: f64,
    pub rain: Option<HashMap<String, f64>>,
    pub snow: Option<HashMap<String, f64>>,
    pub dt_txt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherEntry {
    pub id: i32,
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clouds {
    pub all: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    #[serde(default)]
    pub deg: f64,
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hCity {
    pub id: i32,
    pub name: String,
    pub coord: Coord,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub timezone: i32,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

// Domain types

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureUnit {
    pub fn from_kelvin(self, kelvin: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => kelvin - 273.15,
            TemperatureUnit::Fahrenheit => (kelvin - 273.15) * 9.0 / 5.0 + 32.0,
            TemperatureUnit::Kelvin => kelvin,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Kelvin => "K",
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "c" | "celsius" | "metric" => Ok(TemperatureUnit::Celsius),
            "f" | "fahrenheit" | "imperial" => Ok(TemperatureUnit::Fahrenheit),
            "k" | "kelvin" | "standard" => Ok(TemperatureUnit::Kelvin),
            other => Err(format!("Unknown temperature unit: {}", other)),
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemperatureUnit::Celsius => "celsius",
            TemperatureUnit::Fahrenheit => "fahrenheit",
            TemperatureUnit::Kelvin => "kelvin",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub category: String,
    pub description: String,
    pub icon: String,
}

impl WeatherCondition {
    pub fn new(category: &str, description: &str, icon: &str) -> Self {
        Self {
            category: category.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
        }
    }

    pub fn unknown() -> Self {
        Self::new("Unknown", "no condition reported", "")
    }

    pub fn from_entries(entries: &[WeatherEntry]) -> Self {
        entries.first().map(Self::from).unwrap_or_else(Self::unknown)
    }

    /// Two-digit numeric prefix of the icon code, e.g. "10" for "10d".
    pub fn icon_prefix(&self) -> &str {
        self.icon.get(..2).unwrap_or(&self.icon)
    }
}

impl From<&WeatherEntry> for WeatherCondition {
    fn from(entry: &WeatherEntry) -> Self {
        Self {
            category: entry.main.clone(),
            description: entry.description.clone(),
            icon: entry.icon.clone(),
        }
    }
}

/// One 3-hour forecast point, temperatures already in the requested unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalSample {
    pub ts: i64,
    pub temp: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub wind_deg: f64,
    pub cloud_pct: f64,
    pub pop: f64,
    pub condition: WeatherCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub samples: Vec<IntervalSample>,
}

impl DayBucket {
    pub fn key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub ts: i64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub temp_day: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub pop: f64,
    pub condition: WeatherCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub ts: i64,
    pub temp: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub pop: f64,
    pub condition: WeatherCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub ts: i64,
    pub location_name: String,
    pub country: Option<String>,
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub wind_deg: f64,
    pub cloud_pct: f64,
    pub utc_offset_secs: i32,
    pub condition: WeatherCondition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub unit: TemperatureUnit,
    pub utc_offset_secs: i32,
    pub current: Option<CurrentConditions>,
    pub daily: Vec<DailyForecast>,
    pub hourly: Vec<HourlyForecast>,
    pub warning: Option<String>,
    pub fetched_at: DateTime<Utc>,
}
