use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Live,
    Mock,
}

impl Provider {
    fn from_env(key: &str) -> Self {
        match env::var(key).as_deref() {
            Ok("mock") => Provider::Mock,
            _ => Provider::Live,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub weather_provider: Provider,
    pub ai_provider: Provider,
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub or_model: String,
    pub openweather_api_key: String,
    pub openweather_base_url: String,
    pub openweather_current_path: String,
    pub openweather_forecast3h_path: String,
    pub app_timezone: String,
    pub database_url: String,
    pub bind_addr: String,
    pub weather_window_secs: u64,
    pub ai_short_window_secs: u64,
    pub ai_detail_window_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub weather_timeout_secs: u64,
    pub ai_timeout_secs: u64,
    pub classify_timeout_secs: u64,
    pub hourly_limit: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let weather_provider = Provider::from_env("WEATHER_PROVIDER");
        let ai_provider = Provider::from_env("AI_PROVIDER");

        Ok(Config {
            openrouter_api_key: required_unless_mock("OPENROUTER_API_KEY", &ai_provider)?,
            openrouter_base_url: env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| "https://openrouter.ai/api/v1/chat/completions".to_string()),
            or_model: env::var("OR_MODEL")
                .unwrap_or_else(|_| "deepseek/deepseek-chat-v3-0324:free".to_string()),
            openweather_api_key: required_unless_mock("OPENWEATHER_API_KEY", &weather_provider)?,
            openweather_base_url: env::var("OPENWEATHER_BASE_URL")
                .unwrap_or_else(|_| "https://api.openweathermap.org".to_string()),
            openweather_current_path: env::var("OPENWEATHER_CURRENT_PATH")
                .unwrap_or_else(|_| "/data/2.5/weather".to_string()),
            openweather_forecast3h_path: env::var("OPENWEATHER_FORECAST3H_PATH")
                .unwrap_or_else(|_| "/data/2.5/forecast".to_string()),
            app_timezone: env::var("APP_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./skylar.db?mode=rwc".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            weather_window_secs: parse_or("FRESHNESS_WEATHER_SECS", 5 * 60)?,
            ai_short_window_secs: parse_or("FRESHNESS_AI_SHORT_SECS", 60 * 60)?,
            ai_detail_window_secs: parse_or("FRESHNESS_AI_DETAIL_SECS", 2 * 60 * 60)?,
            retry_attempts: parse_or("RETRY_ATTEMPTS", 2)?,
            retry_delay_ms: parse_or("RETRY_DELAY_MS", 1000)?,
            weather_timeout_secs: parse_or("WEATHER_TIMEOUT_SECS", 10)?,
            ai_timeout_secs: parse_or("AI_TIMEOUT_SECS", 30)?,
            classify_timeout_secs: parse_or("AI_CLASSIFY_TIMEOUT_SECS", 5)?,
            hourly_limit: parse_or("HOURLY_LIMIT", 8)?,
            weather_provider,
            ai_provider,
        })
    }

    pub fn weather_window(&self) -> Duration {
        Duration::from_secs(self.weather_window_secs)
    }

    pub fn ai_short_window(&self) -> Duration {
        Duration::from_secs(self.ai_short_window_secs)
    }

    pub fn ai_detail_window(&self) -> Duration {
        Duration::from_secs(self.ai_detail_window_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for Config {
    /// Offline configuration: mock providers, in-memory database.
    fn default() -> Self {
        Config {
            weather_provider: Provider::Mock,
            ai_provider: Provider::Mock,
            openrouter_api_key: String::new(),
            openrouter_base_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            or_model: "deepseek/deepseek-chat-v3-0324:free".to_string(),
            openweather_api_key: String::new(),
            openweather_base_url: "https://api.openweathermap.org".to_string(),
            openweather_current_path: "/data/2.5/weather".to_string(),
            openweather_forecast3h_path: "/data/2.5/forecast".to_string(),
            app_timezone: "UTC".to_string(),
            database_url: "sqlite::memory:".to_string(),
            bind_addr: "127.0.0.1:8080".to_string(),
            weather_window_secs: 5 * 60,
            ai_short_window_secs: 60 * 60,
            ai_detail_window_secs: 2 * 60 * 60,
            retry_attempts: 2,
            retry_delay_ms: 1000,
            weather_timeout_secs: 10,
            ai_timeout_secs: 30,
            classify_timeout_secs: 5,
            hourly_limit: 8,
        }
    }
}

fn required_unless_mock(key: &str, provider: &Provider) -> anyhow::Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value),
        Err(_) if *provider == Provider::Mock => Ok(String::new()),
        Err(_) => Err(anyhow::anyhow!("{} not set", key)),
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}
