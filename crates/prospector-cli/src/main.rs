use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod crawl;
mod csv;

#[derive(Debug, Parser)]
#[command(name = "prospector")]
#[command(about = "Business listing crawler for map-search services")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl listings for a subject in a location and persist them.
    Crawl(CrawlArgs),
    /// Apply pending database migrations.
    Migrate,
}

#[derive(Debug, clap::Args)]
struct CrawlArgs {
    /// What to search for, e.g. "plumber".
    #[arg(long)]
    subject: String,
    /// Where to search, e.g. "Austin, TX".
    #[arg(long)]
    location: String,
    /// Where records go.
    #[arg(long, value_enum, default_value_t = SinkKind::Database)]
    sink: SinkKind,
    /// Output path for the csv sink.
    #[arg(long, default_value = "businesses.csv")]
    output: PathBuf,
    /// Override the configured extraction worker pool size.
    #[arg(long)]
    max_extractors: Option<usize>,
    /// Override the configured retry budget.
    #[arg(long)]
    max_retries: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    Database,
    Csv,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = prospector_core::load_app_config_from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Crawl(args) => crawl::run_crawl_command(&config, &args).await,
        Commands::Migrate => {
            let pool = prospector_db::connect_pool_from_app_config(&config).await?;
            let applied = prospector_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
            Ok(())
        }
    }
}
