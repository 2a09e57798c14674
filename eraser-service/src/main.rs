use eraser_service::config::AppConfig;
use eraser_service::services::metrics::init_metrics;
use eraser_service::startup::Application;
use service_core::error::AppError;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_metrics();

    let config = AppConfig::load()?;
    init_tracing("eraser-service", &config.common.log_level);

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;
    Ok(())
}
