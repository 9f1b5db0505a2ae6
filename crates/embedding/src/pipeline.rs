//! Record → embedded record: embed, normalize, assemble.

use burn::prelude::*;
use fasta::{Dataset, Record};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::embedder::SequenceEmbedder;
use crate::normalize::{normalize, NormalizationStats};
use crate::ragged::to_ragged;
use crate::types::{EmbeddedRecord, EmbeddingError};

/// `[pipeline]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Embedding workers; `None` means one per available core.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Drop a final batch smaller than `batch_size`.
    #[serde(default = "default_drop_remainder")]
    pub drop_remainder: bool,
    /// Reject model outputs with a different hidden size.
    #[serde(default)]
    pub expected_hidden: Option<usize>,
}

fn default_batch_size() -> usize {
    32
}

fn default_drop_remainder() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            batch_size: default_batch_size(),
            drop_remainder: default_drop_remainder(),
            expected_hidden: None,
        }
    }
}

impl PipelineConfig {
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Log a warning for settings that are legal but probably unintended.
    pub fn validate(&self) {
        if self.workers == Some(0) {
            tracing::warn!("pipeline.workers is 0; embedding will fail to start");
        }
        if self.batch_size == 0 {
            tracing::warn!("pipeline.batch_size is 0; batching will fail to start");
        }
    }
}

/// Embeds and normalizes records one at a time.
pub struct EmbeddingPipeline<B: Backend> {
    embedder: SequenceEmbedder<B>,
    stats: Option<NormalizationStats>,
}

impl<B: Backend> EmbeddingPipeline<B> {
    pub fn new(embedder: SequenceEmbedder<B>, stats: NormalizationStats) -> Self {
        Self {
            embedder,
            stats: Some(stats),
        }
    }

    /// Emit raw layer-summed embeddings, e.g. to adapt statistics from them.
    pub fn without_normalization(embedder: SequenceEmbedder<B>) -> Self {
        Self {
            embedder,
            stats: None,
        }
    }

    pub fn embedder(&self) -> &SequenceEmbedder<B> {
        &self.embedder
    }

    pub fn stats(&self) -> Option<&NormalizationStats> {
        self.stats.as_ref()
    }

    /// Embed, add the leading batch axis, normalize, and convert to a
    /// single-row ragged batch.
    pub fn process(&self, record: &Record) -> Result<EmbeddedRecord, EmbeddingError> {
        let embedding = self.embedder.embed_one(&record.sequence)?.unsqueeze_dim::<3>(0);
        let embedding = match &self.stats {
            Some(stats) => normalize(embedding, stats)?,
            None => embedding,
        };
        Ok(EmbeddedRecord {
            identifier: record.identifier.clone(),
            sequence: record.sequence.clone(),
            embedding: to_ragged(embedding)?,
        })
    }

    /// Lazily process the dataset in order.
    pub fn iter<'a>(
        &'a self,
        dataset: &'a Dataset,
    ) -> impl Iterator<Item = Result<EmbeddedRecord, EmbeddingError>> + 'a {
        dataset.iter().map(move |record| self.process(record))
    }

    /// Process every record on a pool of `workers` threads.
    ///
    /// Results come back in dataset order. The first error aborts the run.
    pub fn process_parallel(
        &self,
        dataset: &Dataset,
        workers: usize,
    ) -> Result<Vec<EmbeddedRecord>, EmbeddingError> {
        self.process_parallel_with(dataset, workers, |_| {})
    }

    /// Like [`process_parallel`](Self::process_parallel), calling `on_done`
    /// from the worker after each successful record.
    pub fn process_parallel_with<F>(
        &self,
        dataset: &Dataset,
        workers: usize,
        on_done: F,
    ) -> Result<Vec<EmbeddedRecord>, EmbeddingError>
    where
        F: Fn(&EmbeddedRecord) + Sync,
    {
        if workers == 0 {
            return Err(EmbeddingError::InvalidWorkers);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("embed-{i}"))
            .build()?;

        let records = dataset.records();
        let embedded = pool.install(|| {
            records
                .par_iter()
                .map(|record| {
                    let embedded = self.process(record)?;
                    on_done(&embedded);
                    Ok(embedded)
                })
                .collect::<Result<Vec<_>, EmbeddingError>>()
        })?;

        tracing::debug!(records = embedded.len(), workers, "Embedded dataset");
        Ok(embedded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbeddingModel;
    use crate::mocks::ResidueEmbedder;
    use burn::backend::ndarray::NdArray;
    use fasta::DatasetBuilder;
    use std::sync::Arc;

    type TestBackend = NdArray<f32>;

    fn pipeline(model: Arc<dyn EmbeddingModel>, hidden: usize) -> EmbeddingPipeline<TestBackend> {
        let embedder = SequenceEmbedder::new(model, Default::default());
        EmbeddingPipeline::new(embedder, NormalizationStats::identity(hidden))
    }

    fn dataset(seqs: &[(&str, &str)]) -> Dataset {
        DatasetBuilder::build(
            seqs.iter()
                .map(|(id, seq)| Record::new(*id, *seq))
                .collect(),
        )
    }

    #[test]
    fn test_process_shapes() {
        let p = pipeline(Arc::new(ResidueEmbedder::new(2, 4)), 4);
        let out = p.process(&Record::new("r1", "MKV")).unwrap();
        assert_eq!(out.identifier, "r1");
        assert_eq!(out.sequence, "MKV");
        assert_eq!(out.embedding.num_rows(), 1);
        assert_eq!(out.embedding.row_len(0), Some(3));
        assert_eq!(out.hidden(), 4);
    }

    #[test]
    fn test_process_normalizes() {
        let model = ResidueEmbedder::new(1, 2);
        let raw = model.embed("A").unwrap().convert::<f32>().to_vec::<f32>().unwrap();
        let stats = NormalizationStats::new(raw.clone(), vec![1.0, 1.0]).unwrap();

        let embedder = SequenceEmbedder::<TestBackend>::new(Arc::new(model), Default::default());
        let p = EmbeddingPipeline::new(embedder, stats);
        let out = p.process(&Record::new("a", "A")).unwrap();
        assert!(out.embedding.values().iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_without_normalization_keeps_raw_values() {
        let model = ResidueEmbedder::new(2, 3);
        let raw = model.embed("W").unwrap().to_vec::<f64>().unwrap();
        let embedder = SequenceEmbedder::<TestBackend>::new(Arc::new(model), Default::default());
        let p = EmbeddingPipeline::without_normalization(embedder);
        assert!(p.stats().is_none());

        let out = p.process(&Record::new("w", "W")).unwrap();
        for (i, v) in out.embedding.values().iter().enumerate() {
            let expected = (raw[i] + raw[i + 3]) as f32;
            assert!((v - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_iter_is_lazy_and_ordered() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let inner = ResidueEmbedder::new(1, 2);
        let model = move |s: &str| -> anyhow::Result<burn::tensor::TensorData> {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            inner.embed(s)
        };
        let p = pipeline(Arc::new(model), 2);
        let data = dataset(&[("long", "AAAA"), ("short", "A"), ("mid", "AA")]);

        let mut it = p.iter(&data);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        let first = it.next().unwrap().unwrap();
        assert_eq!(first.identifier, "short");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let rest: Vec<String> = it.map(|r| r.unwrap().identifier).collect();
        assert_eq!(rest, vec!["mid", "long"]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let p = pipeline(Arc::new(ResidueEmbedder::new(3, 5)), 5);
        let data = dataset(&[
            ("a", "MKVL"),
            ("b", "M"),
            ("c", "WWWWWW"),
            ("d", "AC"),
            ("e", "ACD"),
        ]);

        let sequential: Vec<EmbeddedRecord> = p.iter(&data).collect::<Result<_, _>>().unwrap();
        let parallel = p.process_parallel(&data, 4).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_parallel_error_and_workers() {
        let model = |s: &str| -> anyhow::Result<burn::tensor::TensorData> {
            if s.contains('X') {
                anyhow::bail!("unknown residue in {s}");
            }
            ResidueEmbedder::new(1, 2).embed(s)
        };
        let p = pipeline(Arc::new(model), 2);
        let data = dataset(&[("ok", "AC"), ("bad", "AXC")]);

        let err = p.process_parallel(&data, 2).unwrap_err();
        assert_eq!(err.to_string(), "unknown residue in AXC");
        assert!(matches!(
            p.process_parallel(&data, 0),
            Err(EmbeddingError::InvalidWorkers)
        ));
    }

    #[test]
    fn test_config_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.batch_size, 32);
        assert!(config.drop_remainder);

        let config: PipelineConfig = toml::from_str("workers = 3\nbatch_size = 8").unwrap();
        assert_eq!(config.resolved_workers(), 3);
        assert_eq!(config.batch_size, 8);
    }
}
