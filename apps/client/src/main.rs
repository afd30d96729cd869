use anyhow::Context;
use sentinel_shared_config::ClientConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod session;

use commands::Command;
use session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_client=debug,sentinel_realtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env().context("failed to load client configuration")?;
    tracing::info!(
        user = %config.user_handle,
        environment = %config.environment,
        api = %config.api.base_url,
        "Starting Sentinel client"
    );

    let session = Session::start(&config).await?;
    println!("Signed in as {}. Type /help for commands.", config.user_handle);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                None
            }
        };

        // EOF or Ctrl-C
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(command) => {
                if !session.execute(command).await {
                    break;
                }
            }
            Err(e) => println!("{e}"),
        }
    }

    session.shutdown().await;
    Ok(())
}
