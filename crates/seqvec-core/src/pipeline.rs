//! Subcommand implementations for the seqvec CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use burn::backend::ndarray::NdArray;
use indicatif::{ProgressBar, ProgressStyle};

use embedding::{
    EmbeddingError, EmbeddingModel, EmbeddingPipeline, EmbeddingReader, EmbeddingWriter, NormalizationStats,
    RaggedBatcher, SequenceEmbedder, StatsAccumulator,
};
use fasta::{load_dataset, Dataset, ParserConfig};
use task_runner::CapturingTask;

use crate::client::HttpEmbedder;
use crate::config::{build_pipeline_config, CliOverrides, PipelineToml};
use crate::scoring::{read_predictions, score};

/// CPU backend for the embedding arithmetic.
pub type CpuBackend = NdArray<f32>;

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    pub input: PathBuf,
    pub workers: Option<usize>,
    pub json: bool,
}

/// Arguments for the `embed` subcommand.
#[derive(Debug)]
pub struct EmbedArgs {
    pub input: PathBuf,
    pub server_url: Option<String>,
    /// Normalization statistics; raw embeddings are written when absent.
    pub stats: Option<PathBuf>,
    pub output: PathBuf,
    pub config: Option<PathBuf>,
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
}

/// Arguments for the `adapt-stats` subcommand.
#[derive(Debug)]
pub struct AdaptStatsArgs {
    /// Parquet file of raw embeddings.
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Arguments for the `score` subcommand.
#[derive(Debug)]
pub struct ScoreArgs {
    pub input: PathBuf,
    pub batch_size: usize,
    pub json: bool,
}

fn progress_bar(total: usize, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(message.to_string());
    pb
}

/// Print length statistics of a FASTA file.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let config = ParserConfig {
        num_workers: args.workers,
        ..ParserConfig::default()
    };
    let dataset = load_dataset(&args.input, &config)?;
    let summary = dataset.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("--- Dataset Summary ---");
    println!("File: {}", args.input.display());
    println!("Records: {}", summary.records);
    println!("Empty sequences: {}", summary.empty_sequences);
    println!("Length: min {} / mean {:.1} / max {}", summary.min_length, summary.mean_length, summary.max_length);
    println!("Total residues: {}", summary.total_residues);
    println!("Duplicate identifiers: {}", summary.duplicate_identifiers);
    for (identifier, count) in dataset.duplicate_identifiers().iter().take(10) {
        println!("  {identifier} x{count}");
    }
    Ok(())
}

/// Parse, embed, normalize, and write a FASTA file to Parquet.
pub async fn run_embed(args: EmbedArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Config: defaults < TOML < CLI
    let overrides = CliOverrides {
        server_url: args.server_url.clone(),
        workers: args.workers,
        batch_size: args.batch_size,
    };
    let config = build_pipeline_config(args.config.as_deref(), &overrides)?;
    let server_url = config
        .embedder
        .server_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No embedding server: pass --server-url or set [embedder].server_url"))?;

    // 2. Parse the dataset on its own thread while the server is probed
    let parse_task = spawn_dataset_load(args.input.clone(), config.parser.clone())?;
    let client = HttpEmbedder::new(&server_url, &config.embedder, tokio::runtime::Handle::current())?;
    let health = client.health_check().await;
    let dataset = parse_task.join()?;
    health?;

    // 3. Normalization statistics
    let stats = match &args.stats {
        Some(path) => Some(NormalizationStats::from_json(path)?),
        None => {
            tracing::warn!("No --stats given; writing raw (unnormalized) embeddings");
            None
        }
    };

    // 4. Embed on a rayon pool, off the async runtime
    let output = args.output.clone();
    let batch_size = config.pipeline.batch_size;
    let model: Arc<dyn EmbeddingModel> = Arc::new(client);
    let (written, batches) = tokio::task::spawn_blocking(move || {
        embed_dataset(model, &dataset, stats, &config, &output)
    })
    .await??;

    let elapsed = start.elapsed();
    println!("\n--- Embed Summary ---");
    println!("Records: {written}");
    println!("Batches of {batch_size}: {batches}");
    println!("Output: {}", args.output.display());
    println!("Elapsed: {:.1}s", elapsed.as_secs_f64());
    Ok(())
}

fn spawn_dataset_load(
    path: PathBuf,
    config: ParserConfig,
) -> anyhow::Result<CapturingTask<Dataset, fasta::FastaError>> {
    let task = CapturingTask::spawn("load-dataset", move || load_dataset(&path, &config))?;
    Ok(task)
}

/// Embed every record of `dataset` and write the result to `output`.
///
/// Returns the number of records written and the number of full batches a
/// consumer would see with the configured batch size.
pub fn embed_dataset(
    model: Arc<dyn EmbeddingModel>,
    dataset: &Dataset,
    stats: Option<NormalizationStats>,
    config: &PipelineToml,
    output: &Path,
) -> anyhow::Result<(usize, usize)> {
    let expected_hidden = resolve_hidden(model.as_ref(), dataset, stats.as_ref(), config)?;
    let embedder = SequenceEmbedder::<CpuBackend>::new(model, Default::default())
        .with_expected_hidden(expected_hidden);
    let pipeline = match stats {
        Some(stats) => EmbeddingPipeline::new(embedder, stats),
        None => EmbeddingPipeline::without_normalization(embedder),
    };

    let workers = config.pipeline.resolved_workers();
    tracing::info!(
        records = dataset.len(),
        workers,
        batch_size = config.pipeline.batch_size,
        "Embedding dataset"
    );

    let pb = progress_bar(dataset.len(), "Embedding sequences");
    let records = pipeline.process_parallel_with(dataset, workers, |_| pb.inc(1))?;
    pb.finish_with_message("done");

    let mut batches = 0;
    let batcher = RaggedBatcher::new(
        records.iter().cloned().map(Ok::<_, EmbeddingError>),
        config.pipeline.batch_size,
    )?
        .drop_remainder(config.pipeline.drop_remainder);
    for batch in batcher {
        let shape = batch?.shape();
        tracing::debug!(rows = shape.rows, max_len = shape.max_len, positions = shape.positions, "Batch");
        batches += 1;
    }

    let hidden = match (records.first(), pipeline.stats(), expected_hidden) {
        (Some(record), _, _) => record.hidden(),
        (None, Some(stats), _) => stats.hidden(),
        (None, None, Some(hidden)) => hidden,
        (None, None, None) => 1,
    };
    let written = records.len();
    let mut writer = EmbeddingWriter::new(output.to_path_buf(), hidden);
    writer.record_all(records)?;
    writer.finish()?;

    Ok((written, batches))
}

/// Hidden size the embedder should enforce.
///
/// Taken from the config, then the statistics. Failing both, and only when
/// the dataset holds empty sequences, the shortest non-empty record is
/// embedded once to learn it: a remote model cannot report the hidden size of
/// a zero-length output.
fn resolve_hidden(
    model: &dyn EmbeddingModel,
    dataset: &Dataset,
    stats: Option<&NormalizationStats>,
    config: &PipelineToml,
) -> anyhow::Result<Option<usize>> {
    if let Some(hidden) = config.pipeline.expected_hidden.or(stats.map(NormalizationStats::hidden)) {
        return Ok(Some(hidden));
    }
    if !dataset.iter().any(|r| r.sequence.is_empty()) {
        return Ok(None);
    }
    let Some(reference) = dataset.iter().find(|r| !r.sequence.is_empty()) else {
        anyhow::bail!(
            "Every sequence is empty; set [pipeline].expected_hidden so their embeddings have a hidden size"
        );
    };
    let shape = model.embed(&reference.sequence)?.shape;
    let hidden = shape.last().copied().unwrap_or(0);
    tracing::debug!(identifier = %reference.identifier, hidden, "Learned hidden size for empty sequences");
    Ok(Some(hidden))
}

/// Adapt normalization statistics from a Parquet file of raw embeddings.
pub fn run_adapt_stats(args: AdaptStatsArgs) -> anyhow::Result<()> {
    let stats = adapt_stats(&args.input)?;
    stats.save_json(&args.output)?;

    println!("--- Normalization Statistics ---");
    println!("Input: {}", args.input.display());
    println!("Hidden size: {}", stats.hidden());
    println!("Output: {}", args.output.display());
    Ok(())
}

pub fn adapt_stats(input: &Path) -> anyhow::Result<NormalizationStats> {
    let records = EmbeddingReader::read_all(input)?;
    let first = records
        .first()
        .ok_or_else(|| anyhow::anyhow!("No embeddings in {}", input.display()))?;

    let mut acc = StatsAccumulator::new(first.hidden());
    for record in &records {
        acc.update(&record.embedding)?;
    }
    tracing::info!(
        records = records.len(),
        positions = acc.count(),
        "Adapted normalization statistics"
    );
    Ok(acc.finish()?)
}

/// Score stored predictions with epoch-level streaming metrics.
pub fn run_score(args: ScoreArgs) -> anyhow::Result<()> {
    let predictions = read_predictions(&args.input)?;
    let report = score(&predictions, args.batch_size)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("--- Score Summary ---");
    println!("File: {}", args.input.display());
    println!("Samples: {}  Batches: {}", report.samples, report.batches);
    for metric in &report.metrics {
        println!("{:>10}: {:.4}", metric.name, metric.value);
    }
    println!("(mean of per-batch mcc: {:.4})", report.mean_batch_mcc);
    Ok(())
}
