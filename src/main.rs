mod cdc;
mod cli;
mod collect;
mod conf;
mod controlhub;

use colored::Colorize;
use human_panic::setup_panic;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    setup_panic!();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skimmer=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match cli::Cli::new() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{} {:?}", "x".red(), e);
            std::process::exit(1);
        }
    };

    match cli.run().await {
        Ok(_) => {}
        Err(e) => {
            eprintln!("{} {:?}", "x".red(), e);
            std::process::exit(1);
        }
    }
}
