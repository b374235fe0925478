use anyhow::{Context, Result};
use clap::Parser;
use fr_config::{ConnectionArgs, LoggingArgs};
use fr_server::http;
use fr_server::service::AppState;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "fr-server")]
#[command(about = "Answer prompts over HTTP by running a hosted flow")]
struct Args {
    /// Address the HTTP server listens on
    #[arg(long, env = "FLOWRUN_HTTP_ADDR", default_value = "127.0.0.1:3000")]
    http_addr: String,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    logging: LoggingArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    fr_config::load_dotenv();
    let args = Args::parse();
    args.logging.init_tracing();

    let client = args.connection.build_client()?;
    let target = args.connection.flow_target()?;
    let app = http::router(AppState::new(Arc::new(client), target));

    let listener = tokio::net::TcpListener::bind(&args.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", args.http_addr))?;
    info!("API server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
