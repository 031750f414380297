use std::sync::Arc;

use clap::Parser;
use gateway::Config;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

use commands::{run, Command};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Sign in before running the command
    #[arg(long, env = "RECIPES_EMAIL", global = true)]
    email: Option<String>,

    #[arg(long, env = "RECIPES_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    info!("Loading config...");
    let config = Config::load()?;
    let gateway = Arc::new(gateway::connect(&config)?);

    if let (Some(email), Some(password)) = (&args.email, &args.password) {
        gateway.login(email, password).await?;
        info!("Signed in as {email}");
    }

    run(args.command, gateway).await
}
