//! cardata CLI binary entry point.

use cardata::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cardata=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();
    let config = cli.config();

    let result = match &cli.command {
        Commands::Login => cardata::cli::auth::handle_login(&config).await,
        Commands::Status => cardata::cli::auth::handle_status(&config).await,
        Commands::Logout => cardata::cli::auth::handle_logout(&config).await,
        Commands::Token => cardata::cli::auth::handle_token(&config).await,
        Commands::Stream(args) => cardata::cli::stream::handle_stream(&config, args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
