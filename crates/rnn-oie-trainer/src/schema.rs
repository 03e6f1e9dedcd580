//! Network dimensions that are only known once a training set is loaded.

use rnn_oie_core::{Dataset, EmbeddingProvider, OieError, Result};
use serde::{Deserialize, Serialize};

/// Shape of the data a network is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Output classes, one per label in the training vocabulary.
    pub num_classes: usize,
    /// Padded sentence length of the training set.
    pub padded_len: usize,
    /// Rows of the word embedding matrix.
    pub vocab_size: usize,
    /// Width of a word vector.
    pub embedding_dim: usize,
}

impl Schema {
    /// Derive the schema from a loaded training set.
    pub fn from_dataset(dataset: &Dataset, embedding: &dyn EmbeddingProvider) -> Result<Self> {
        let schema = Self {
            num_classes: dataset.vocabulary.len(),
            padded_len: dataset.inputs.padded_len(),
            vocab_size: embedding.vocab_size(),
            embedding_dim: embedding.dim(),
        };
        schema.check_embedding(embedding)?;
        if schema.num_classes == 0 {
            return Err(OieError::InvalidConfig("training set has no labels".into()));
        }
        Ok(schema)
    }

    /// Fail unless `embedding` has the shape this schema was built with.
    pub fn check_embedding(&self, embedding: &dyn EmbeddingProvider) -> Result<()> {
        if embedding.vocab_size() != self.vocab_size || embedding.dim() != self.embedding_dim {
            return Err(OieError::Embedding(format!(
                "expected a {}x{} embedding, got {}x{}",
                self.vocab_size,
                self.embedding_dim,
                embedding.vocab_size(),
                embedding.dim()
            )));
        }
        if embedding.dim() == 0 {
            return Err(OieError::Embedding("embedding dimension is zero".into()));
        }
        Ok(())
    }
}
