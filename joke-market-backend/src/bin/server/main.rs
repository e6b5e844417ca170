mod telemetry;

use joke_market_backend::error::AppError;
use joke_market_backend::run_server;
use joke_market_config::get_config;
use telemetry::setup_telemetry;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    setup_telemetry();

    let config = get_config()?;
    run_server(&config).await?.await
}
