//! CLI handler for `cardata stream`.

use std::sync::Arc;

use crate::cli::auth::terminal_prompt;
use crate::cli::StreamArgs;
use crate::client::Client;
use crate::config::CardataConfig;
use crate::stream::{StreamedMessage, VehicleKey};

fn print_message(message: StreamedMessage) {
    match serde_json::to_string(&message) {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("⚠️  Could not render message: {e}"),
    }
}

/// Handle `cardata stream`.
pub async fn handle_stream(
    config: &CardataConfig,
    args: &StreamArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut keys = args.vins.iter().map(VehicleKey::vin).collect::<Vec<_>>();
    if args.all {
        keys.push(VehicleKey::AnyVehicle);
    }
    if keys.is_empty() {
        return Err("pass --vin <VIN> or --all".into());
    }

    let client = Client::from_config(config, terminal_prompt())?.with_on_error(Arc::new(|e| {
        eprintln!("⚠️  {e}");
    }));
    for key in keys {
        client.subscribe(key, print_message).await?;
    }

    tokio::select! {
        result = client.start_event_stream() => result?,
        _ = tokio::signal::ctrl_c() => {
            client.stop_event_stream().await;
            return Ok(());
        }
    }
    eprintln!("✅ Streaming, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    client.stop_event_stream().await;
    Ok(())
}
