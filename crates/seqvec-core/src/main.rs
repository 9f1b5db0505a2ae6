use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use seqvec_core::pipeline::{self, AdaptStatsArgs, EmbedArgs, ScoreArgs, SummaryArgs};

/// seqvec: sequence datasets to normalized ragged embeddings, plus epoch-level scoring.
#[derive(Parser)]
#[command(name = "seqvec", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print length statistics of a FASTA file.
    Summary {
        /// Path to the FASTA file.
        #[arg(long)]
        input: PathBuf,
        /// Number of parser threads (default: all cores).
        #[arg(long)]
        workers: Option<usize>,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
    /// Embed every sequence of a FASTA file and write a Parquet dataset.
    Embed {
        /// Path to the FASTA file.
        #[arg(long)]
        input: PathBuf,
        /// URL of the embedding server (e.g., http://localhost:8000).
        #[arg(long)]
        server_url: Option<String>,
        /// Normalization statistics JSON. Raw embeddings are written without it.
        #[arg(long)]
        stats: Option<PathBuf>,
        /// Path for the output Parquet file.
        #[arg(long)]
        output: PathBuf,
        /// Path to pipeline config TOML file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the number of parser and embedding workers.
        #[arg(long)]
        workers: Option<usize>,
        /// Override the batch size.
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Adapt normalization statistics from a Parquet file of raw embeddings.
    AdaptStats {
        /// Parquet file written by `embed` without `--stats`.
        #[arg(long)]
        input: PathBuf,
        /// Output statistics JSON.
        #[arg(long)]
        output: PathBuf,
    },
    /// Score a Parquet file of labels and predictions with streaming metrics.
    Score {
        /// Parquet file with `label` and `prediction` columns.
        #[arg(long)]
        input: PathBuf,
        /// Samples per metric update.
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Summary {
            input,
            workers,
            json,
        } => pipeline::run_summary(SummaryArgs {
            input,
            workers,
            json,
        }),
        Command::Embed {
            input,
            server_url,
            stats,
            output,
            config,
            workers,
            batch_size,
        } => {
            pipeline::run_embed(EmbedArgs {
                input,
                server_url,
                stats,
                output,
                config,
                workers,
                batch_size,
            })
            .await
        }
        Command::AdaptStats { input, output } => {
            pipeline::run_adapt_stats(AdaptStatsArgs { input, output })
        }
        Command::Score {
            input,
            batch_size,
            json,
        } => pipeline::run_score(ScoreArgs {
            input,
            batch_size,
            json,
        }),
    }
}
