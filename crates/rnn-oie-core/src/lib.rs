//! # RNN-OIE Core
//!
//! The data side of the supervised Open IE tagger: reading tabular datasets,
//! grouping rows into sentences, padding variable-length sequences and
//! managing the label vocabulary.
//!
//! ## Quick Start
//!
//! ```rust
//! use rnn_oie_core::padding::pad_sequences;
//! use rnn_oie_core::Sample;
//!
//! let sentences = vec![
//!     vec![Sample::new(4), Sample::new(9), Sample::new(2)],
//!     vec![Sample::new(7)],
//! ];
//! let padded = pad_sequences(&sentences, Some(20), Sample::pad).unwrap();
//!
//! assert_eq!(padded[1], vec![Sample::new(7), Sample::PAD, Sample::PAD]);
//! ```
pub mod dataset;
pub mod embedding;
pub mod error;
pub mod padding;
pub mod sample;
pub mod table;
pub mod vocab;

// Re-export primary API
pub use dataset::{
    Dataset, EncodedInput, EncodedOutput, LabelPolicy, LoaderConfig, SentenceGroup,
};
pub use embedding::{CorpusVocab, EmbeddingProvider, Glove, UNKNOWN_INDEX};
pub use error::{OieError, Result};
pub use padding::pad_sequences;
pub use sample::Sample;
pub use table::Table;
pub use vocab::{LabelVocabulary, VocabVersion};
