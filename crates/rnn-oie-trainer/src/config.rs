//! Hyperparameters of the tagger.

use std::path::Path;

use rnn_oie_core::{LoaderConfig, OieError, Result};
use serde::{Deserialize, Serialize};

/// Model configuration, fixed when a [`crate::Tagger`] is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Maximum sentence length in tokens, used for padding / truncating.
    pub sent_maxlen: usize,
    /// Hidden units per LSTM direction.
    pub hidden_units: usize,
    /// Number of stacked bidirectional LSTM layers.
    pub num_of_latent_layers: usize,
    /// Dropout applied to the word embeddings.
    pub emb_dropout: f32,
    /// Dropout applied before the prediction layers.
    pub pred_dropout: f32,
    /// Units of each hidden dense layer.
    pub dense_units: usize,
    /// Number of hidden dense layers before the softmax layer.
    pub num_of_dense_layers: usize,
    /// Sentences per training batch.
    pub batch_size: usize,
    /// Passes over the training set.
    pub epochs: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Whether the loss propagates into the word embeddings.
    pub trainable_emb: bool,
    /// Seed for batch shuffling.
    pub seed: u64,
    /// Field separator of dataset files.
    pub sep: char,
    /// Keep the sentence with the largest `run_id` when loading files.
    pub include_last_group: bool,
    /// Log sampled predictions every this many epochs (0 disables).
    pub diagnostic_interval: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sent_maxlen: 20,
            hidden_units: 128,
            num_of_latent_layers: 2,
            emb_dropout: 0.1,
            pred_dropout: 0.1,
            dense_units: 1028,
            num_of_dense_layers: 3,
            batch_size: 50,
            epochs: 10,
            learning_rate: 1e-3,
            trainable_emb: true,
            seed: 42,
            sep: '\t',
            include_last_group: false,
            diagnostic_interval: 1,
        }
    }
}

impl ModelConfig {
    /// Create a configuration with default hyperparameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON configuration; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the maximum sentence length.
    pub fn with_sent_maxlen(mut self, sent_maxlen: usize) -> Self {
        self.sent_maxlen = sent_maxlen;
        self
    }

    /// Set the hidden units per LSTM direction.
    pub fn with_hidden_units(mut self, hidden_units: usize) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    /// Set the number of stacked LSTM layers.
    pub fn with_latent_layers(mut self, layers: usize) -> Self {
        self.num_of_latent_layers = layers;
        self
    }

    /// Set the hidden dense layer shape.
    pub fn with_dense_layers(mut self, layers: usize, units: usize) -> Self {
        self.num_of_dense_layers = layers;
        self.dense_units = units;
        self
    }

    /// Set both dropout rates.
    pub fn with_dropout(mut self, emb_dropout: f32, pred_dropout: f32) -> Self {
        self.emb_dropout = emb_dropout;
        self.pred_dropout = pred_dropout;
        self
    }

    /// Set the number of training epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Freeze or unfreeze the word embeddings.
    pub fn with_trainable_emb(mut self, trainable: bool) -> Self {
        self.trainable_emb = trainable;
        self
    }

    /// Set the shuffling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the diagnostic sampling interval.
    pub fn with_diagnostic_interval(mut self, interval: usize) -> Self {
        self.diagnostic_interval = interval;
        self
    }

    /// Check that every hyperparameter is usable.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("sent_maxlen", self.sent_maxlen),
            ("hidden_units", self.hidden_units),
            ("num_of_latent_layers", self.num_of_latent_layers),
            ("dense_units", self.dense_units),
            ("batch_size", self.batch_size),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(OieError::InvalidConfig(format!("{} must be positive", name)));
        }

        let dropouts = [
            ("emb_dropout", self.emb_dropout),
            ("pred_dropout", self.pred_dropout),
        ];
        for (name, rate) in dropouts {
            if !(0.0..1.0).contains(&rate) {
                return Err(OieError::InvalidConfig(format!(
                    "{} must be in [0, 1), got {}",
                    name, rate
                )));
            }
        }

        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(OieError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }

        Ok(())
    }

    /// Loader options matching this configuration.
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig::default()
            .with_sep(self.sep)
            .with_sent_maxlen(Some(self.sent_maxlen))
            .with_last_group(self.include_last_group)
    }
}
