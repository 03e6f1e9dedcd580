//! # Word Embedding Providers
//!
//! The dataset loader only needs a word → index mapping; the trainer also
//! needs the dimension and, when available, a pretrained weight matrix to
//! initialise its embedding layer from. Index `0` is reserved for padding and
//! index `1` for out-of-vocabulary words in every provider.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{OieError, Result};
use crate::sample::Sample;
use crate::table::Table;

/// Index assigned to words missing from the vocabulary.
pub const UNKNOWN_INDEX: u32 = 1;

/// Number of reserved indices at the start of every vocabulary.
const RESERVED: usize = 2;

/// Maps words to embedding indices and dense vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Dimension of each word vector.
    fn dim(&self) -> usize;

    /// Number of rows in the embedding matrix, reserved indices included.
    fn vocab_size(&self) -> usize;

    /// Embedding index of `word`, or [`UNKNOWN_INDEX`].
    fn word_index(&self, word: &str) -> u32;

    /// Row-major `vocab_size × dim` pretrained weights, if any.
    fn pretrained(&self) -> Option<&[f32]>;
}

/// Pretrained vectors read from a GloVe-style text file.
///
/// Each line holds a word followed by its whitespace-separated components.
#[derive(Debug, Clone)]
pub struct Glove {
    words: HashMap<String, u32>,
    weights: Vec<f32>,
    dim: usize,
}

impl Glove {
    /// Load vectors from `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let glove = Self::from_reader(BufReader::new(file))?;
        tracing::info!(
            "Loaded {} embeddings of dimension {} from {}",
            glove.words.len(),
            glove.dim,
            path.display()
        );
        Ok(glove)
    }

    /// Parse vectors from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut words = HashMap::new();
        let mut weights = Vec::new();
        let mut dim = 0usize;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };

            let vector = parts
                .map(str::parse::<f32>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| OieError::Embedding(format!("line {}: {}", idx + 1, e)))?;

            if dim == 0 {
                if vector.is_empty() {
                    return Err(OieError::Embedding(format!(
                        "line {}: word {:?} has no vector",
                        idx + 1,
                        word
                    )));
                }
                dim = vector.len();
                weights.resize(RESERVED * dim, 0.0);
            } else if vector.len() != dim {
                return Err(OieError::Embedding(format!(
                    "line {}: expected {} components, found {}",
                    idx + 1,
                    dim,
                    vector.len()
                )));
            }

            if words.contains_key(word) {
                tracing::debug!("Duplicate embedding for {:?} ignored", word);
                continue;
            }
            words.insert(word.to_string(), (RESERVED + words.len()) as u32);
            weights.extend(vector);
        }

        if dim == 0 {
            return Err(OieError::Embedding("embedding file is empty".into()));
        }

        Ok(Self {
            words,
            weights,
            dim,
        })
    }
}

impl EmbeddingProvider for Glove {
    fn dim(&self) -> usize {
        self.dim
    }

    fn vocab_size(&self) -> usize {
        RESERVED + self.words.len()
    }

    fn word_index(&self, word: &str) -> u32 {
        self.words
            .get(word)
            .or_else(|| self.words.get(&word.to_lowercase()))
            .copied()
            .unwrap_or(UNKNOWN_INDEX)
    }

    fn pretrained(&self) -> Option<&[f32]> {
        Some(&self.weights)
    }
}

/// A vocabulary built from the tokens of a dataset, without pretrained vectors.
#[derive(Debug, Clone)]
pub struct CorpusVocab {
    words: HashMap<String, u32>,
    dim: usize,
}

impl CorpusVocab {
    /// Index every distinct word, in first-seen order.
    pub fn from_words<I, S>(words: I, dim: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = HashMap::new();
        for word in words {
            let next = (RESERVED + index.len()) as u32;
            index.entry(word.as_ref().to_string()).or_insert(next);
        }
        Self { words: index, dim }
    }

    /// Index the words of the given columns of `table`.
    pub fn from_table(table: &Table, columns: &[&str], dim: usize) -> Result<Self> {
        let mut words = Vec::new();
        for column in columns {
            words.extend(table.column(column)?);
        }
        let vocab = Self::from_words(words, dim);
        tracing::info!(
            "Built corpus vocabulary of {} words (dimension {})",
            vocab.words.len(),
            dim
        );
        Ok(vocab)
    }
}

impl EmbeddingProvider for CorpusVocab {
    fn dim(&self) -> usize {
        self.dim
    }

    fn vocab_size(&self) -> usize {
        RESERVED + self.words.len()
    }

    fn word_index(&self, word: &str) -> u32 {
        self.words.get(word).copied().unwrap_or(UNKNOWN_INDEX)
    }

    fn pretrained(&self) -> Option<&[f32]> {
        None
    }
}

/// Encode a word through `provider` as a [`Sample`].
pub fn sample_of(provider: &dyn EmbeddingProvider, word: &str) -> Sample {
    Sample::new(provider.word_index(word))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const VECTORS: &str = "the 0.1 0.2 0.3\nsaw 1.0 -1.0 0.5\nJohn 0.0 0.0 1.0\n";

    #[test]
    fn test_glove_indices_skip_reserved() {
        let glove = Glove::from_reader(Cursor::new(VECTORS)).unwrap();
        assert_eq!(glove.dim(), 3);
        assert_eq!(glove.vocab_size(), 5);
        assert_eq!(glove.word_index("the"), 2);
        assert_eq!(glove.word_index("John"), 4);
        assert_eq!(glove.word_index("SAW"), 3);
        assert_eq!(glove.word_index("mary"), UNKNOWN_INDEX);
    }

    #[test]
    fn test_glove_weights_layout() {
        let glove = Glove::from_reader(Cursor::new(VECTORS)).unwrap();
        let weights = glove.pretrained().unwrap();
        assert_eq!(weights.len(), glove.vocab_size() * glove.dim());
        assert_eq!(&weights[..6], &[0.0; 6]);
        assert_eq!(&weights[9..12], &[1.0, -1.0, 0.5]);
    }

    #[test]
    fn test_glove_rejects_ragged_vectors() {
        let err = Glove::from_reader(Cursor::new("a 1 2\nb 1\n")).unwrap_err();
        assert!(matches!(err, OieError::Embedding(msg) if msg.contains("line 2")));
    }

    #[test]
    fn test_glove_rejects_empty_file() {
        assert!(Glove::from_reader(Cursor::new("\n")).is_err());
    }

    #[test]
    fn test_corpus_vocab() {
        let vocab = CorpusVocab::from_words(["a", "b", "a", "c"], 8);
        assert_eq!(vocab.vocab_size(), 5);
        assert_eq!(vocab.word_index("a"), 2);
        assert_eq!(vocab.word_index("c"), 4);
        assert_eq!(vocab.word_index("z"), UNKNOWN_INDEX);
        assert!(vocab.pretrained().is_none());
        assert_eq!(sample_of(&vocab, "b").encode(), 3);
    }
}
