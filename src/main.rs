use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ai;
mod config;
mod forecast;
mod freshness;
mod routes;
mod service;
mod store;
mod utils;

use ai::{AiClient, MockAiClient, TextGenerator};
use config::{Config, Provider};
use forecast::mock::MockWeatherClient;
use forecast::openweather::OpenWeatherClient;
use forecast::WeatherSource;
use routes::{create_router, AppState};
use service::WeatherService;
use store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skylar_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let app_tz = utils::parse_timezone(&config.app_timezone).map_err(anyhow::Error::msg)?;
    tracing::info!("Using app timezone {}", app_tz);

    let store = Store::connect(&config.database_url).await?;
    store.init_tables().await?;

    let weather_source: Arc<dyn WeatherSource> = match config.weather_provider {
        Provider::Live => Arc::new(OpenWeatherClient::new(config.clone())?),
        Provider::Mock => {
            tracing::warn!("WEATHER_PROVIDER=mock, serving generated weather");
            Arc::new(MockWeatherClient::new())
        }
    };
    let text_generator: Arc<dyn TextGenerator> = match config.ai_provider {
        Provider::Live => Arc::new(AiClient::new(config.clone())?),
        Provider::Mock => {
            tracing::warn!("AI_PROVIDER=mock, serving canned AI text");
            Arc::new(MockAiClient::new())
        }
    };

    let service = WeatherService::new(&config, weather_source, text_generator)?;
    let bind_addr = config.bind_addr.clone();

    let state = AppState {
        config: Arc::new(config),
        service: Arc::new(service),
        store: Arc::new(store),
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
