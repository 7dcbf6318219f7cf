use crate::config::Config;
use crate::forecast::types::{DailyForecast, TemperatureUnit, WeatherReport};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

pub const FALLBACK_SUMMARY: &str =
    "Weather insights are taking a short break. Check the forecast details below for today's conditions.";
pub const FALLBACK_CHAT: &str =
    "Sorry, I couldn't reach my weather brain just now. Please try again in a moment.";
pub const OFF_TOPIC_REPLY: &str =
    "I'm Skylar, your weather companion. Ask me about the forecast, what to wear, or how the weather fits your plans.";
pub const FALLBACK_EVENT_ADVICE: &str =
    "Keep an eye on the forecast as your event gets closer and have a backup plan for rain.";

pub fn fallback_recommendations() -> Vec<String> {
    vec![
        "Dress in layers so you can adapt as the day changes.".to_string(),
        "Carry water and sun protection if you'll be outdoors.".to_string(),
        "Check the hourly forecast before heading out.".to_string(),
    ]
}

const SYSTEM_PROMPT: &str = "You are Skylar, a friendly weather companion. Give clear, practical advice grounded in the weather data you are given. Be concise.";

// Matched as whole words, so "Sunday" is not "sun".
const WEATHER_KEYWORDS: [&str; 33] = [
    "weather", "forecast", "rain", "rainy", "raining", "sun", "sunny", "sunshine", "snow", "snowy",
    "snowing", "wind", "windy", "temperature", "cold", "hot", "warm", "umbrella", "storm", "stormy",
    "cloud", "clouds", "cloudy", "humid", "humidity", "wear", "jacket", "coat", "degrees", "freezing",
    "heat", "thunder", "fog",
];

#[derive(Error, Debug)]
pub enum AiError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Empty response")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// One prompt sent to the text-generation source.
#[derive(Debug, Clone)]
pub struct Completion<'a> {
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub timeout: Option<Duration>,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: Completion<'_>) -> Result<String, AiError>;
}

pub struct AiClient {
    client: Client,
    config: Config,
}

impl AiClient {
    pub fn new(config: Config) -> Result<Self, AiError> {
        let client = Client::builder()
            .user_agent("Skylar/1.0")
            .timeout(Duration::from_secs(config.ai_timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl TextGenerator for AiClient {
    async fn complete(&self, request: Completion<'_>) -> Result<String, AiError> {
        let body = ChatRequest {
            model: self.config.or_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt.to_string(),
                },
            ],
            max_tokens: request.max_tokens,
            temperature: 0.7,
            stream: false,
        };

        let mut builder = self
            .client
            .post(&self.config.openrouter_base_url)
            .header("Authorization", format!("Bearer {}", self.config.openrouter_api_key))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await?;

        match response.status() {
            reqwest::StatusCode::OK => {
                let chat_response: ChatResponse = response.json().await?;
                let text = chat_response
                    .choices
                    .into_iter()
                    .next()
                    .map(|choice| choice.message.content.trim().to_string())
                    .ok_or_else(|| AiError::ApiError("No response choices".to_string()))?;
                if text.is_empty() {
                    return Err(AiError::EmptyResponse);
                }
                Ok(text)
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(AiError::RateLimited),
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(AiError::ApiError(format!("HTTP {}: {}", status, error_text)))
            }
        }
    }
}

/// Structured weather context attached to every prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherContext {
    pub location: String,
    pub unit: String,
    pub current_temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub condition: Option<String>,
    pub humidity: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub today_min: Option<f64>,
    pub today_max: Option<f64>,
    pub rain_chance_pct: Option<f64>,
    pub upcoming: Vec<String>,
}

impl WeatherContext {
    pub fn from_report(report: &WeatherReport) -> Self {
        let current = report.current.as_ref();
        let today = report.daily.first();

        Self {
            location: report.location.clone(),
            unit: report.unit.symbol().to_string(),
            current_temp: current.map(|c| round1(c.temp)),
            feels_like: current.map(|c| round1(c.feels_like)),
            condition: current
                .map(|c| c.condition.description.clone())
                .or_else(|| today.map(|d| d.condition.description.clone())),
            humidity: current.map(|c| c.humidity),
            wind_speed_ms: current.map(|c| c.wind_speed),
            today_min: today.map(|d| round1(d.temp_min)),
            today_max: today.map(|d| round1(d.temp_max)),
            rain_chance_pct: today.map(|d| (d.pop * 100.0).round()),
            upcoming: report
                .daily
                .iter()
                .skip(1)
                .map(|d| describe_day(d, report.unit))
                .collect(),
        }
    }
}

fn describe_day(day: &DailyForecast, unit: TemperatureUnit) -> String {
    format!(
        "{}: {}, {:.0}-{:.0}{}, {:.0}% rain",
        day.date.format("%a %b %-d"),
        day.condition.description,
        day.temp_min,
        day.temp_max,
        unit.symbol(),
        day.pop * 100.0
    )
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn with_context(instructions: &str, context: &WeatherContext) -> String {
    let context_json = serde_json::to_string_pretty(context).unwrap_or_default();
    format!("Weather context (JSON):\n{}\n\n{}", context_json, instructions)
}

pub async fn weather_summary(gen: &dyn TextGenerator, context: &WeatherContext) -> Result<String, AiError> {
    let prompt = with_context(
        "Write a friendly 2-sentence summary of today's weather and what it means for the day ahead.",
        context,
    );
    gen.complete(Completion {
        prompt: &prompt,
        max_tokens: 150,
        timeout: None,
    })
    .await
}

/// Clothing and activity tips, one per line.
pub async fn recommendations(gen: &dyn TextGenerator, context: &WeatherContext) -> Result<Vec<String>, AiError> {
    let prompt = with_context(
        "List 3 to 5 practical recommendations for clothing and activities today. \
         Put each recommendation on its own line without numbering.",
        context,
    );
    let text = gen
        .complete(Completion {
            prompt: &prompt,
            max_tokens: 400,
            timeout: None,
        })
        .await?;

    let lines = split_lines(&text);
    if lines.is_empty() {
        return Err(AiError::EmptyResponse);
    }
    Ok(lines)
}

pub async fn chat_reply(
    gen: &dyn TextGenerator,
    question: &str,
    context: &WeatherContext,
) -> Result<String, AiError> {
    let prompt = with_context(
        &format!("The user asks: \"{}\"\nAnswer in at most 4 sentences.", question),
        context,
    );
    gen.complete(Completion {
        prompt: &prompt,
        max_tokens: 300,
        timeout: None,
    })
    .await
}

pub async fn event_advice(
    gen: &dyn TextGenerator,
    event_title: &str,
    day: Option<&DailyForecast>,
    context: &WeatherContext,
) -> Result<String, AiError> {
    let forecast_line = match day {
        Some(d) => format!("Forecast for the event day: {}.", describe_day(d, unit_from_symbol(&context.unit))),
        None => "No forecast is available for the event day yet.".to_string(),
    };
    let prompt = with_context(
        &format!(
            "The user is planning \"{}\". {}\nGive 2-3 sentences of weather-aware planning advice.",
            event_title, forecast_line
        ),
        context,
    );
    gen.complete(Completion {
        prompt: &prompt,
        max_tokens: 250,
        timeout: None,
    })
    .await
}

/// Lightweight yes/no classification of a chat message.
pub async fn classify_weather_question(
    gen: &dyn TextGenerator,
    question: &str,
    timeout: Duration,
) -> Result<bool, AiError> {
    let prompt = format!(
        "Is the following message about weather, climate, clothing for the weather, or planning around the weather? \
         Answer with only YES or NO.\nMessage: \"{}\"",
        question
    );
    let answer = gen
        .complete(Completion {
            prompt: &prompt,
            max_tokens: 3,
            timeout: Some(timeout),
        })
        .await?;

    Ok(answer.trim().to_uppercase().starts_with("YES"))
}

pub fn looks_weather_related(question: &str) -> bool {
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| WEATHER_KEYWORDS.contains(&word))
}

/// Split model output into display lines, dropping bullets and numbering.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let line = line.trim();
            let line = line.trim_start_matches(['-', '*', '•']).trim_start();
            let without_number = line
                .split_once(". ")
                .filter(|(prefix, _)| !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()))
                .map(|(_, rest)| rest)
                .unwrap_or(line);
            without_number.trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn unit_from_symbol(symbol: &str) -> TemperatureUnit {
    match symbol {
        "°F" => TemperatureUnit::Fahrenheit,
        "K" => TemperatureUnit::Kelvin,
        _ => TemperatureUnit::Celsius,
    }
}

// Offline generator for tests and AI_PROVIDER=mock
pub struct MockAiClient {
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MockAiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAiClient {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for MockAiClient {
    async fn complete(&self, request: Completion<'_>) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AiError::ApiError("HTTP 503: mock outage".to_string()));
        }

        if request.prompt.contains("Answer with only YES or NO") {
            let message = request.prompt.rsplit("Message:").next().unwrap_or_default();
            let verdict = if looks_weather_related(message) { "YES" } else { "NO" };
            return Ok(verdict.to_string());
        }
        if request.prompt.contains("on its own line") {
            return Ok("- Wear light layers\n- Bring sunglasses\n\n- Stay hydrated".to_string());
        }
        Ok("Expect a mild day with a few clouds; a light jacket will do.".to_string())
    }
}
