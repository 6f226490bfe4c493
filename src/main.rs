/// Approvalway server entry point
///
/// Initializes configuration from the environment and starts the HTTP server:
/// - Chain preview and request lifecycle at /api/chains/*, /api/requests/*
/// - Directory hot reload at /api/directory/reload
/// - Health check at /healthz

use approvalway::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
