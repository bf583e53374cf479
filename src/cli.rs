use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "newsreel", about = "Resumable news crawler & article extractor")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start crawling from seed URLs
    Crawl {
        /// Seed URLs (comma-separated or file path)
        #[arg(short, long)]
        seeds: Option<String>,

        /// Single seed URL
        #[arg(long)]
        seed: Option<String>,

        /// Hub/front-page URLs seeded with their own priority class
        #[arg(long)]
        hub_seeds: Option<String>,

        /// Maximum crawl depth
        #[arg(short, long)]
        depth: Option<u32>,

        /// Job id (generated when absent)
        #[arg(long)]
        job_id: Option<String>,
    },
    /// Run as a subprocess speaking JSON lines on stdin/stdout
    Worker,
    /// Show crawl status and database stats
    Status,
    /// Export article URLs as JSON lines
    Export {
        /// Output file
        #[arg(short, long)]
        output: String,

        /// Rows fetched per batch while streaming
        #[arg(long, default_value = "500")]
        batch_size: i64,
    },
}
