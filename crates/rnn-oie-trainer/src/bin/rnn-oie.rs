//! Train a supervised Open IE tagger and evaluate it on a test file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rnn_oie_core::{CorpusVocab, EmbeddingProvider, Glove, Table};
use rnn_oie_trainer::{ModelConfig, SampleOptions, Tagger};
use tracing_subscriber::EnvFilter;

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "rnn-oie")]
#[command(about = "Train and evaluate a BiLSTM tagger for supervised Open IE")]
#[command(version)]
struct Cli {
    /// Training file (tab-separated, with run_id/word/pred/label columns)
    #[arg(long)]
    train: PathBuf,

    /// Test file, same format as the training file
    #[arg(long)]
    test: PathBuf,

    /// GloVe-style text embeddings; without it a vocabulary is built from the training file
    #[arg(long)]
    glove: Option<PathBuf>,

    /// JSON model configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum sentence length [default: 20]
    #[arg(long)]
    sent_maxlen: Option<usize>,

    /// Number of training epochs [default: 100]
    #[arg(long)]
    epochs: Option<usize>,

    /// Number of stacked BiLSTM layers [default: 3]
    #[arg(long)]
    layers: Option<usize>,

    /// Embedding dimension when no --glove file is given
    #[arg(long, default_value_t = 100)]
    embedding_dim: usize,

    /// Directory to save the trained model to
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rnn_oie=info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("rnn-oie failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ModelConfig::from_json_file(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?,
        None => ModelConfig::default()
            .with_sent_maxlen(20)
            .with_epochs(100)
            .with_latent_layers(3),
    };
    if let Some(sent_maxlen) = cli.sent_maxlen {
        config = config.with_sent_maxlen(sent_maxlen);
    }
    if let Some(epochs) = cli.epochs {
        config = config.with_epochs(epochs);
    }
    if let Some(layers) = cli.layers {
        config = config.with_latent_layers(layers);
    }

    let embedding: Arc<dyn EmbeddingProvider> = match &cli.glove {
        Some(path) => Arc::new(
            Glove::from_file(path)
                .with_context(|| format!("Cannot load embeddings '{}'", path.display()))?,
        ),
        None => {
            let table = Table::read(&cli.train, config.sep)
                .with_context(|| format!("Cannot read '{}'", cli.train.display()))?;
            Arc::new(CorpusVocab::from_table(&table, &["word", "pred"], cli.embedding_dim)?)
        }
    };

    let mut tagger = Tagger::new(config, embedding)?;
    tagger
        .train(&cli.train)
        .with_context(|| format!("Training on '{}' failed", cli.train.display()))?;

    if let Some(dir) = &cli.save {
        tagger.save(dir)?;
    }

    let prediction = tagger
        .predict(&cli.test)
        .with_context(|| format!("Predicting '{}' failed", cli.test.display()))?;
    println!("ACC: {:.2}", prediction.accuracy());

    let sample = tagger.sample_labels(&prediction.probabilities, SampleOptions::default())?;
    println!("{:#?}", sample);

    Ok(())
}
