//! Flowrun CLI library

use anyhow::{anyhow, Result};
use fr_api_contract::IoType;
use fr_config::{ConnectionArgs, LoggingArgs};
use fr_rest_client::{RestClientError, RunOutcome, StreamCallbacks};
use serde_json::Value;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::error;

// Re-export CLI types for testing
pub use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "fr")]
#[command(about = "Run a hosted flow once and print its answer")]
#[command(version, author, long_about = None)]
pub struct Cli {
    /// Message sent to the flow
    pub message: String,

    /// Input type of the flow (chat, text, any, ...)
    #[arg(default_value = "chat")]
    pub input_type: IoType,

    /// Output type of the flow (chat, text, any, debug, ...)
    #[arg(default_value = "chat")]
    pub output_type: IoType,

    /// Pass `true` to stream the answer as it is produced
    #[arg(default_value = "false")]
    pub stream: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

/// Text carried by a stream update, when it has one
pub fn chunk_text(update: &Value) -> Option<&str> {
    update.get("chunk").and_then(Value::as_str)
}

impl Cli {
    /// Only the literal `true` turns streaming on
    pub fn stream_requested(&self) -> bool {
        self.stream == "true"
    }

    /// Run the flow once and print its answer
    pub async fn run(self) -> Result<()> {
        let client = self.connection.build_client()?;
        let target = self.connection.flow_target()?;
        let request = target.request(
            self.message.as_str(),
            self.input_type.clone(),
            self.output_type.clone(),
            self.stream_requested(),
        );

        let failure = Arc::new(Mutex::new(None::<String>));
        let recorded = failure.clone();
        let handler = StreamCallbacks::new(
            |update: Value| {
                let mut stdout = std::io::stdout().lock();
                let _ = match chunk_text(&update) {
                    Some(chunk) => write!(stdout, "{}", chunk),
                    None => writeln!(stdout, "{}", update),
                };
                let _ = stdout.flush();
            },
            |_message: String| println!(),
            move |e: &RestClientError| {
                error!(error = %e, "Stream Error");
                if let Ok(mut slot) = recorded.lock() {
                    slot.get_or_insert_with(|| e.to_string());
                }
            },
        );

        match client.run_flow(&request, handler).await? {
            RunOutcome::Completed(response) => {
                println!("{}", response.message_text()?);
            }
            RunOutcome::Streaming { stream, .. } => {
                stream.wait().await?;
                let failed = failure.lock().map_err(|_| anyhow!("stream state poisoned"))?.take();
                if let Some(message) = failed {
                    return Err(anyhow!("stream failed: {}", message));
                }
            }
        }

        Ok(())
    }
}
