use crate::demo::{
    run_catalog_check, run_demo, run_recommend, CatalogCheckArgs, DemoArgs, RecommendArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use dealmap::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "dealmap",
    about = "Match discount programs to nearby venues and rank them for a user",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Rank venues from a profile and venue export without starting the server
    Recommend(RecommendArgs),
    /// Inspect a catalog export
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Walk through a recommendation against the bundled demo catalog
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Load a catalog export and report integrity warnings
    Check(CatalogCheckArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Catalog JSON export (defaults to DEALMAP_CATALOG_PATH, then the demo catalog)
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Recommend(args) => run_recommend(args).await,
        Command::Catalog {
            command: CatalogCommand::Check(args),
        } => run_catalog_check(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
