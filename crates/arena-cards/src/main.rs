use crate::prelude::*;
use clap::Parser;

mod arena;
mod config;
mod error;
mod fetch;
mod generate;
mod prelude;
mod process;
#[cfg(feature = "qr")]
mod qr;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Fetch an are.na collection and render it as a printable deck of typst cards"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Path to the configuration file.
    #[clap(
        long,
        env = "ARENA_CARDS_CONFIG",
        global = true,
        default_value = "config.json"
    )]
    config: std::path::PathBuf,

    /// Whether to display additional information.
    #[clap(long, env = "ARENA_CARDS_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Download channel and block data from the are.na API
    Fetch(fetch::FetchOptions),

    /// Normalize raw blocks, filter by date, and download their images
    Process(process::ProcessOptions),

    /// Render processed blocks into the typst card layout
    Generate(generate::GenerateOptions),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Fetch(options) => fetch::run(options, app.global).await,
        SubCommands::Process(options) => process::run(options, app.global).await,
        SubCommands::Generate(options) => generate::run(options, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
