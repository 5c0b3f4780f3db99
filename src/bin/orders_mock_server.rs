use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use orderdesk::{config, mock_backend::MockBackend};

const FALLBACK_ADMIN_EMAIL: &str = "admin@shop.vn";
const FALLBACK_ADMIN_PASSWORD: &str = "quantri123";

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config().context("failed to load application config")?;
    config::init_tracing(config.log_level(), config.log_json);

    let (email, password) = match (&config.mock_admin_email, &config.mock_admin_password) {
        (Some(email), Some(password)) => (email.clone(), password.clone()),
        _ => {
            warn!("mock_admin_email/mock_admin_password not set; using built-in demo admin");
            (
                FALLBACK_ADMIN_EMAIL.to_string(),
                FALLBACK_ADMIN_PASSWORD.to_string(),
            )
        }
    };

    let backend = MockBackend::new();
    backend
        .seed_demo(&email, &password)
        .context("failed to seed demo data")?;

    let addr = format!("{}:{}", config.mock_host, config.mock_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Starting orders reference backend on {}", addr);
    orderdesk::mock_backend::serve(listener, backend)
        .await
        .context("server error")?;
    Ok(())
}
