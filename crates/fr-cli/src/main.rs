use anyhow::Result;
use fr_cli::{Cli, Parser};

#[tokio::main]
async fn main() -> Result<()> {
    fr_config::load_dotenv();
    let cli = Cli::parse();
    cli.logging.init_tracing();

    cli.run().await
}
