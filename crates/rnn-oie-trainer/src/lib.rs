//! # RNN-OIE Trainer
//!
//! Trains and evaluates a stacked bidirectional LSTM that tags each token of
//! a sentence relative to one of its predicates, on top of the encoding
//! pipeline in `rnn-oie-core`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rnn_oie_core::Glove;
//! use rnn_oie_trainer::{ModelConfig, Tagger};
//!
//! let glove = Glove::from_file("glove.6B.50d.txt")?;
//! let mut tagger = Tagger::new(ModelConfig::new().with_epochs(5), Arc::new(glove))?;
//! tagger.train("train.tsv")?;
//! let accuracy = tagger.test("test.tsv")?;
//! println!("{:.2}", accuracy);
//! # Ok::<(), rnn_oie_core::OieError>(())
//! ```
pub mod batch;
pub mod config;
pub mod network;
pub mod schema;
pub mod tagger;

pub use config::ModelConfig;
pub use network::{EmbeddingOptions, Network};
pub use schema::Schema;
pub use tagger::{EpochStats, LabelSample, Prediction, SampleOptions, Tagger, TrainReport};
