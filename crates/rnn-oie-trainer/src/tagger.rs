//! # Open IE Tagger
//!
//! Owns the configuration, the trained network and the label vocabulary it
//! was trained with, and runs training, evaluation and inference over dataset
//! files.
//!
//! Every dataset file is loaded with a vocabulary fit on its own label
//! column. When an evaluation file's label set differs from the training
//! file's, its gold class indices do not line up with the network's outputs;
//! this is logged as a warning, and decoding through [`Tagger::decode_label`]
//! only accepts indices stamped with the training vocabulary's version.

use std::path::Path;
use std::sync::Arc;

use candle_core::Device;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use oorandom::Rand32;
use rnn_oie_core::{
    Dataset, EmbeddingProvider, EncodedInput, EncodedOutput, LabelPolicy, LabelVocabulary,
    OieError, Result, VocabVersion,
};
use serde::{Deserialize, Serialize};

use crate::batch::{sequential_batches, shuffled_batches, Batch};
use crate::config::ModelConfig;
use crate::network::{categorical_cross_entropy, Network};
use crate::schema::Schema;

/// File holding the network weights inside a saved model directory.
pub const WEIGHTS_FILE: &str = "model.safetensors";
/// File holding a frozen embedding matrix inside a saved model directory.
pub const FROZEN_WEIGHTS_FILE: &str = "embedding.safetensors";
/// File holding configuration, schema and vocabulary inside a saved model directory.
pub const METADATA_FILE: &str = "tagger.json";

fn candle(e: candle_core::Error) -> OieError {
    OieError::Candle(e.to_string())
}

/// Loss and token accuracy of one training epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
}

/// Summary of a training run.
#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    pub epochs: Vec<EpochStats>,
}

impl TrainReport {
    /// Stats of the last epoch, if any ran.
    pub fn last(&self) -> Option<&EpochStats> {
        self.epochs.last()
    }
}

/// Gold labels of a dataset next to the network's class probabilities.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// One-hot gold labels, stamped with the file's own vocabulary.
    pub gold: EncodedOutput,
    /// `[sentence][position][class]` probabilities.
    pub probabilities: Vec<Vec<Vec<f32>>>,
    /// Version of the vocabulary the probability columns belong to.
    pub vocab_version: VocabVersion,
}

impl Prediction {
    /// Most probable class per position.
    pub fn predicted_classes(&self) -> Vec<Vec<usize>> {
        self.probabilities
            .iter()
            .map(|sent| sent.iter().map(|probs| argmax(probs)).collect())
            .collect()
    }

    /// Percentage of non-padding positions whose most probable class is the gold class.
    pub fn accuracy(&self) -> f64 {
        let (correct, total) = token_accuracy(&self.gold, &self.probabilities);
        if total == 0 {
            return 0.0;
        }
        correct as f64 / total as f64 * 100.0
    }
}

/// Which slice of a prediction [`Tagger::sample_labels`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleOptions {
    pub num_of_sents: usize,
    pub num_of_samples: usize,
    pub num_of_classes: usize,
    pub start_index: usize,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            num_of_sents: 5,
            num_of_samples: 10,
            num_of_classes: 3,
            start_index: 5,
        }
    }
}

/// Top classes per position: `[sentence][position][(label, probability)]`.
pub type LabelSample = Vec<Vec<Vec<(String, f32)>>>;

#[derive(Serialize, Deserialize)]
struct Metadata {
    config: ModelConfig,
    schema: Schema,
    vocabulary: LabelVocabulary,
}

struct Trained {
    schema: Schema,
    vocabulary: LabelVocabulary,
    network: Network,
    varmap: VarMap,
}

impl Trained {
    fn probabilities(
        &self,
        inputs: &EncodedInput,
        batch_size: usize,
        device: &Device,
    ) -> Result<Vec<Vec<Vec<f32>>>> {
        let mut probabilities = Vec::with_capacity(inputs.sentences());
        for indices in sequential_batches(inputs.sentences(), batch_size) {
            let batch = Batch::inputs(inputs, &indices, device).map_err(candle)?;
            let probs = self
                .network
                .probabilities(&batch.words, &batch.predicates)
                .and_then(|t| t.to_vec3::<f32>())
                .map_err(candle)?;
            probabilities.extend(probs);
        }
        Ok(probabilities)
    }

    fn sample_labels(
        &self,
        probabilities: &[Vec<Vec<f32>>],
        options: SampleOptions,
    ) -> Result<LabelSample> {
        let version = self.vocabulary.version();
        probabilities
            .iter()
            .take(options.num_of_sents)
            .map(|sent| {
                sent.iter()
                    .skip(options.start_index)
                    .take(options.num_of_samples)
                    .map(|word| {
                        ranked(word)
                            .into_iter()
                            .take(options.num_of_classes)
                            .map(|class| -> Result<(String, f32)> {
                                let label = self.vocabulary.decode(version, class)?;
                                Ok((label.to_string(), word[class]))
                            })
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }
}

/// A stacked BiLSTM tagger for supervised Open IE.
pub struct Tagger {
    config: ModelConfig,
    embedding: Arc<dyn EmbeddingProvider>,
    device: Device,
    trained: Option<Trained>,
}

impl Tagger {
    /// Create an untrained tagger.
    pub fn new(config: ModelConfig, embedding: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            embedding,
            device: Device::Cpu,
            trained: None,
        })
    }

    /// Run on `device` instead of the CPU.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// The configuration this tagger was created with.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The network schema, once trained.
    pub fn schema(&self) -> Option<&Schema> {
        self.trained.as_ref().map(|t| &t.schema)
    }

    /// Whether a network has been built.
    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    fn trained(&self) -> Result<&Trained> {
        self.trained.as_ref().ok_or(OieError::NotTrained)
    }

    /// The frozen training vocabulary.
    pub fn vocabulary(&self) -> Result<&LabelVocabulary> {
        Ok(&self.trained()?.vocabulary)
    }

    /// Labels the network classifies into, by class index.
    pub fn classes(&self) -> Result<&[String]> {
        Ok(self.vocabulary()?.classes())
    }

    /// Number of output classes.
    pub fn num_of_classes(&self) -> Result<usize> {
        Ok(self.vocabulary()?.len())
    }

    /// Load and encode a dataset file with this tagger's loader settings.
    pub fn load_dataset<P: AsRef<Path>>(
        &self,
        path: P,
        policy: LabelPolicy<'_>,
    ) -> Result<Dataset> {
        Dataset::load(path, &self.config.loader_config(), self.embedding.as_ref(), policy)
    }

    /// Train on `path` and then evaluate on `test_path`, returning the test accuracy.
    pub fn train_and_test<P, Q>(&mut self, path: P, test_path: Q) -> Result<f64>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        self.train(path)?;
        self.test(test_path)
    }

    /// Train a fresh network on the dataset at `path`.
    ///
    /// The label vocabulary and the output layer width are taken from this
    /// file. A previously trained network is replaced once fitting succeeds
    /// and kept if it fails.
    pub fn train<P: AsRef<Path>>(&mut self, path: P) -> Result<TrainReport> {
        let path = path.as_ref();
        let dataset = self.load_dataset(path, LabelPolicy::Fit)?;
        tracing::debug!(
            "Classes: ({}, {:?})",
            dataset.vocabulary.len(),
            dataset.vocabulary.classes()
        );

        let schema = Schema::from_dataset(&dataset, self.embedding.as_ref())?;
        let mut varmap = VarMap::new();
        let network = Network::build(
            &schema,
            &self.config,
            self.embedding.as_ref(),
            &mut varmap,
            &self.device,
        )
        .map_err(candle)?;

        let trained = Trained {
            schema,
            vocabulary: dataset.vocabulary.clone(),
            network,
            varmap,
        };

        tracing::info!(
            "Training on {} ({} sentences, padded to {})",
            path.display(),
            dataset.len(),
            schema.padded_len
        );
        let report = self.fit(&trained, &dataset)?;
        self.trained = Some(trained);
        Ok(report)
    }

    fn fit(&self, trained: &Trained, dataset: &Dataset) -> Result<TrainReport> {
        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(trained.varmap.all_vars(), params).map_err(candle)?;
        let mut rng = Rand32::new(self.config.seed);
        let mut report = TrainReport::default();

        for epoch in 1..=self.config.epochs {
            let mut loss_sum = 0.0f32;
            let mut batches = 0usize;
            let mut correct = 0usize;
            let mut total = 0usize;

            for indices in shuffled_batches(dataset.len(), self.config.batch_size, &mut rng) {
                let labelled =
                    Batch::labelled(&dataset.inputs, &dataset.outputs, &indices, &self.device)
                        .map_err(candle)?;

                let logits = trained
                    .network
                    .forward(&labelled.batch.words, &labelled.batch.predicates, true)
                    .map_err(candle)?;
                let loss = categorical_cross_entropy(&logits, &labelled.targets).map_err(candle)?;
                optimizer.backward_step(&loss).map_err(candle)?;

                loss_sum += loss.to_scalar::<f32>().map_err(candle)?;
                batches += 1;

                let logits: Vec<Vec<Vec<f32>>> = logits.to_vec3().map_err(candle)?;
                let gold = subset(&dataset.outputs, &indices);
                let (c, t) = token_accuracy(&gold, &logits);
                correct += c;
                total += t;
            }

            let stats = EpochStats {
                epoch,
                loss: if batches > 0 { loss_sum / batches as f32 } else { 0.0 },
                accuracy: if total > 0 { correct as f32 / total as f32 } else { 0.0 },
            };
            tracing::info!(
                "Epoch {}/{} - loss: {:.4} - accuracy: {:.2}%",
                epoch,
                self.config.epochs,
                stats.loss,
                stats.accuracy * 100.0
            );
            report.epochs.push(stats);

            if self.diagnostic_due(epoch) && tracing::enabled!(tracing::Level::DEBUG) {
                let sample = self.diagnostics(trained, &dataset.inputs, SampleOptions::default())?;
                tracing::debug!("Sampled predictions after epoch {}: {:?}", epoch, sample);
            }
        }

        Ok(report)
    }

    /// Whether sampled predictions are reported after `epoch` (1-based).
    fn diagnostic_due(&self, epoch: usize) -> bool {
        let interval = self.config.diagnostic_interval;
        interval > 0 && epoch % interval == 0
    }

    fn diagnostics(
        &self,
        trained: &Trained,
        inputs: &EncodedInput,
        options: SampleOptions,
    ) -> Result<LabelSample> {
        let probabilities = trained.probabilities(inputs, self.config.batch_size, &self.device)?;
        trained.sample_labels(&probabilities, options)
    }

    /// Evaluate on the dataset at `path`, returning token accuracy in percent.
    pub fn test<P: AsRef<Path>>(&self, path: P) -> Result<f64> {
        let prediction = self.predict(path)?;
        let acc = prediction.accuracy();
        tracing::info!("ACC: {:.2}", acc);
        Ok(acc)
    }

    /// Run the network over the dataset at `path`.
    ///
    /// Returns the gold labels next to the raw class probabilities, without
    /// scoring them.
    pub fn predict<P: AsRef<Path>>(&self, path: P) -> Result<Prediction> {
        let trained = self.trained()?;
        let path = path.as_ref();
        let dataset = self.load_dataset(path, LabelPolicy::Fit)?;

        if dataset.vocabulary.version() != trained.vocabulary.version() {
            tracing::warn!(
                "Labels of {} ({:?}) differ from the training labels ({:?}); \
                 gold and predicted class indices are not comparable",
                path.display(),
                dataset.vocabulary.classes(),
                trained.vocabulary.classes()
            );
        }

        let probabilities = self.probabilities(&dataset.inputs)?;
        Ok(Prediction {
            gold: dataset.outputs,
            probabilities,
            vocab_version: trained.vocabulary.version(),
        })
    }

    /// Class probabilities for already encoded inputs.
    pub fn probabilities(&self, inputs: &EncodedInput) -> Result<Vec<Vec<Vec<f32>>>> {
        self.trained()?
            .probabilities(inputs, self.config.batch_size, &self.device)
    }

    /// Map a predicted class index back to its textual tag.
    ///
    /// `version` must be the training vocabulary's, as carried by
    /// [`Prediction::vocab_version`].
    pub fn decode_label(&self, version: VocabVersion, index: usize) -> Result<&str> {
        self.vocabulary()?.decode(version, index)
    }

    /// The most probable classes of a few positions, for eyeballing how
    /// predictions look.
    pub fn sample_labels(
        &self,
        probabilities: &[Vec<Vec<f32>>],
        options: SampleOptions,
    ) -> Result<LabelSample> {
        self.trained()?.sample_labels(probabilities, options)
    }

    /// Write the weights and metadata into `dir`, creating it if needed.
    ///
    /// A frozen embedding is written to its own file since the optimizer
    /// never sees it.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let trained = self.trained()?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        trained.varmap.save(dir.join(WEIGHTS_FILE)).map_err(candle)?;
        let embedding = trained.network.embedding();
        if !embedding.options().trainable {
            embedding
                .frozen()
                .save(dir.join(FROZEN_WEIGHTS_FILE))
                .map_err(candle)?;
        }
        let metadata = Metadata {
            config: self.config.clone(),
            schema: trained.schema,
            vocabulary: trained.vocabulary.clone(),
        };
        std::fs::write(dir.join(METADATA_FILE), serde_json::to_string_pretty(&metadata)?)?;

        tracing::info!("Model saved to {}", dir.display());
        Ok(())
    }

    /// Restore a tagger written by [`Tagger::save`].
    ///
    /// `embedding` must be the provider the model was trained with.
    pub fn load<P: AsRef<Path>>(dir: P, embedding: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let dir = dir.as_ref();
        let metadata: Metadata =
            serde_json::from_str(&std::fs::read_to_string(dir.join(METADATA_FILE))?)?;
        metadata.config.validate()?;
        metadata.schema.check_embedding(embedding.as_ref())?;

        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        let mut network = Network::build(
            &metadata.schema,
            &metadata.config,
            embedding.as_ref(),
            &mut varmap,
            &device,
        )
        .map_err(candle)?;
        varmap.load(dir.join(WEIGHTS_FILE)).map_err(candle)?;
        if !network.embedding().options().trainable {
            network
                .embedding_mut()
                .frozen_mut()
                .load(dir.join(FROZEN_WEIGHTS_FILE))
                .map_err(candle)?;
        }

        tracing::info!("Model loaded from {}", dir.display());
        Ok(Self {
            config: metadata.config,
            embedding,
            device,
            trained: Some(Trained {
                schema: metadata.schema,
                vocabulary: metadata.vocabulary,
                network,
                varmap,
            }),
        })
    }
}

fn subset(outputs: &EncodedOutput, indices: &[usize]) -> EncodedOutput {
    EncodedOutput {
        vocab_version: outputs.vocab_version,
        num_classes: outputs.num_classes,
        labels: indices.iter().map(|&i| outputs.labels[i].clone()).collect(),
    }
}

/// `(correct, total)` over non-padding positions of `gold`.
fn token_accuracy(gold: &EncodedOutput, scores: &[Vec<Vec<f32>>]) -> (usize, usize) {
    let mut correct = 0;
    let mut total = 0;
    for (s, sent) in scores.iter().enumerate() {
        for (t, word) in sent.iter().enumerate() {
            if let Some(class) = gold.class_at(s, t) {
                total += 1;
                if argmax(word) == class {
                    correct += 1;
                }
            }
        }
    }
    (correct, total)
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Class indices sorted by descending score.
fn ranked(values: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}
