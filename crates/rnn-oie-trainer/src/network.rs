//! Stacked bidirectional LSTM tagger.
//!
//! Word and predicate ids share one embedding table. Their vectors are
//! concatenated per position and run through the recurrent layers, a dropout,
//! the hidden dense layers and finally a per-position linear layer producing
//! one logit per class.

use candle_core::{DType, Device, Result, Tensor, D};
use candle_nn::rnn::Direction;
use candle_nn::{
    lstm, Dropout, Embedding, Init, LSTMConfig, Linear, Module, VarBuilder, VarMap, LSTM, RNN,
};
use rnn_oie_core::EmbeddingProvider;

use crate::config::ModelConfig;
use crate::schema::Schema;

/// Name of the embedding matrix in the variable map.
pub const EMBEDDING_WEIGHT: &str = "embedding.weight";

/// Options for the shared word embedding layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddingOptions {
    pub dropout: f32,
    pub trainable: bool,
    pub input_length: usize,
}

impl EmbeddingOptions {
    /// Embedding options taken from a model configuration.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            dropout: config.emb_dropout,
            trainable: config.trainable_emb,
            input_length: config.sent_maxlen,
        }
    }
}

/// Word embedding lookup followed by dropout.
pub struct WordEmbedding {
    embedding: Embedding,
    dropout: Dropout,
    options: EmbeddingOptions,
    frozen: VarMap,
}

impl WordEmbedding {
    /// Build the embedding layer, initialised from `provider`'s pretrained
    /// vectors when it has any.
    ///
    /// Trainable embeddings are registered in `varmap`. Frozen ones live in
    /// the layer's own map, see [`WordEmbedding::frozen`], and never reach the
    /// optimizer.
    pub fn new(
        provider: &dyn EmbeddingProvider,
        schema: &Schema,
        options: EmbeddingOptions,
        varmap: &mut VarMap,
        device: &Device,
    ) -> Result<Self> {
        let shape = (schema.vocab_size, schema.embedding_dim);
        let init = Init::Uniform { lo: -0.05, up: 0.05 };
        let mut frozen = VarMap::new();
        let target = if options.trainable { varmap } else { &mut frozen };

        let vb = VarBuilder::from_varmap(target, DType::F32, device);
        let weight = vb.get_with_hints(shape, EMBEDDING_WEIGHT, init)?;
        if let Some(pretrained) = provider.pretrained() {
            let pretrained = Tensor::from_slice(pretrained, shape, device)?;
            target.set_one(EMBEDDING_WEIGHT, pretrained)?;
        }
        // Shares storage with the variable, so loading the map still updates it.
        let weight = if options.trainable { weight } else { weight.detach() };

        Ok(Self {
            embedding: Embedding::new(weight, schema.embedding_dim),
            dropout: Dropout::new(options.dropout),
            options,
            frozen,
        })
    }

    /// Embed `ids` of shape `[batch, len]` into `[batch, len, dim]`.
    ///
    /// `len` may be shorter than the configured input length but never longer.
    pub fn forward(&self, ids: &Tensor, train: bool) -> Result<Tensor> {
        let (_, len) = ids.dims2()?;
        if len > self.options.input_length {
            candle_core::bail!(
                "sequence length {len} exceeds embedding input length {}",
                self.options.input_length
            );
        }
        let xs = self.embedding.forward(ids)?;
        self.dropout.forward(&xs, train)
    }

    /// The options this layer was built with.
    pub fn options(&self) -> EmbeddingOptions {
        self.options
    }

    /// Weights that are not trained but still belong to the model. Empty for
    /// a trainable embedding.
    pub fn frozen(&self) -> &VarMap {
        &self.frozen
    }

    /// Mutable access to [`WordEmbedding::frozen`], for restoring saved weights.
    pub fn frozen_mut(&mut self) -> &mut VarMap {
        &mut self.frozen
    }
}

/// One bidirectional LSTM layer returning the full sequence.
pub struct BiLstm {
    forward: LSTM,
    backward: LSTM,
}

impl BiLstm {
    /// Build layer `layer_idx` reading `in_dim` features per position.
    pub fn new(in_dim: usize, hidden: usize, layer_idx: usize, vb: VarBuilder) -> Result<Self> {
        let forward = lstm(
            in_dim,
            hidden,
            LSTMConfig {
                layer_idx,
                ..Default::default()
            },
            vb.clone(),
        )?;
        let backward = lstm(
            in_dim,
            hidden,
            LSTMConfig {
                layer_idx,
                direction: Direction::Backward,
                ..Default::default()
            },
            vb,
        )?;
        Ok(Self { forward, backward })
    }

    /// `[batch, len, in_dim]` → `[batch, len, 2 * hidden]`.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let fwd = self.forward.states_to_tensor(&self.forward.seq(xs)?)?;
        let reversed = reverse_time(xs)?;
        let bwd = self
            .backward
            .states_to_tensor(&self.backward.seq(&reversed)?)?;
        let bwd = reverse_time(&bwd)?;
        Tensor::cat(&[&fwd, &bwd], D::Minus1)
    }
}

/// Reverse a `[batch, len, features]` tensor along its time axis.
fn reverse_time(xs: &Tensor) -> Result<Tensor> {
    let len = xs.dim(1)?;
    let order: Vec<u32> = (0..len as u32).rev().collect();
    let order = Tensor::from_vec(order, len, xs.device())?;
    xs.index_select(&order, 1)
}

/// The full tagging network.
pub struct Network {
    embedding: WordEmbedding,
    latent: Vec<BiLstm>,
    dropout: Dropout,
    dense: Vec<Linear>,
    classifier: Linear,
}

impl Network {
    /// Build the network for `schema`, registering its parameters in `varmap`.
    pub fn build(
        schema: &Schema,
        config: &ModelConfig,
        provider: &dyn EmbeddingProvider,
        varmap: &mut VarMap,
        device: &Device,
    ) -> Result<Self> {
        let embedding = WordEmbedding::new(
            provider,
            schema,
            EmbeddingOptions::from_config(config),
            varmap,
            device,
        )?;
        let vb = VarBuilder::from_varmap(varmap, DType::F32, device);

        let mut in_dim = 2 * schema.embedding_dim;
        let mut latent = Vec::with_capacity(config.num_of_latent_layers);
        for layer_idx in 0..config.num_of_latent_layers {
            latent.push(BiLstm::new(in_dim, config.hidden_units, layer_idx, vb.pp("lstm"))?);
            in_dim = 2 * config.hidden_units;
        }

        let mut dense = Vec::with_capacity(config.num_of_dense_layers);
        for idx in 0..config.num_of_dense_layers {
            let vb = vb.pp(format!("dense.{}", idx));
            dense.push(candle_nn::linear(in_dim, config.dense_units, vb)?);
            in_dim = config.dense_units;
        }
        let classifier = candle_nn::linear(in_dim, schema.num_classes, vb.pp("classifier"))?;

        tracing::debug!(
            "Built network: {} BiLSTM layers of {} units, {} dense layers of {} units, {} classes",
            latent.len(),
            config.hidden_units,
            dense.len(),
            config.dense_units,
            schema.num_classes
        );

        Ok(Self {
            embedding,
            latent,
            dropout: Dropout::new(config.pred_dropout),
            dense,
            classifier,
        })
    }

    /// Per-position class logits `[batch, len, num_classes]`.
    pub fn forward(&self, words: &Tensor, predicates: &Tensor, train: bool) -> Result<Tensor> {
        let xs = Tensor::cat(
            &[
                self.embedding.forward(words, train)?,
                self.embedding.forward(predicates, train)?,
            ],
            D::Minus1,
        )?;

        let xs = self
            .latent
            .iter()
            .try_fold(xs, |xs, layer| layer.forward(&xs))?;
        let mut xs = self.dropout.forward(&xs, train)?;

        for layer in &self.dense {
            xs = layer.forward(&xs)?.relu()?;
        }
        self.classifier.forward(&xs)
    }

    /// The embedding layer shared by words and predicates.
    pub fn embedding(&self) -> &WordEmbedding {
        &self.embedding
    }

    /// Mutable access to the embedding layer.
    pub fn embedding_mut(&mut self) -> &mut WordEmbedding {
        &mut self.embedding
    }

    /// Per-position class probabilities, inference mode.
    pub fn probabilities(&self, words: &Tensor, predicates: &Tensor) -> Result<Tensor> {
        let logits = self.forward(words, predicates, false)?;
        candle_nn::ops::softmax(&logits, D::Minus1)
    }
}

/// Categorical cross-entropy of `logits` against one-hot `targets`, averaged
/// over every position. All-zero padding targets contribute nothing.
pub fn categorical_cross_entropy(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    let (batch, len, _) = logits.dims3()?;
    let positions = (batch * len).max(1) as f64;
    let log_probs = candle_nn::ops::log_softmax(logits, D::Minus1)?;
    log_probs
        .mul(targets)?
        .sum_all()?
        .neg()?
        .affine(1.0 / positions, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rnn_oie_core::{CorpusVocab, Glove};
    use std::io::Cursor;

    fn schema(vocab_size: usize, embedding_dim: usize) -> Schema {
        Schema {
            num_classes: 3,
            padded_len: 4,
            vocab_size,
            embedding_dim,
        }
    }

    fn small_config() -> ModelConfig {
        ModelConfig::new()
            .with_hidden_units(5)
            .with_latent_layers(2)
            .with_dense_layers(1, 7)
    }

    fn ids(rows: &[[u32; 4]]) -> Tensor {
        let flat: Vec<u32> = rows.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (rows.len(), 4), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_forward_shape() {
        let provider = CorpusVocab::from_words(["a", "b", "c"], 6);
        let mut varmap = VarMap::new();
        let network = Network::build(
            &schema(5, 6),
            &small_config(),
            &provider,
            &mut varmap,
            &Device::Cpu,
        )
        .unwrap();

        let words = ids(&[[2, 3, 4, 0], [4, 1, 0, 0]]);
        let preds = ids(&[[3, 3, 3, 3], [4, 4, 4, 4]]);
        let logits = network.forward(&words, &preds, true).unwrap();
        assert_eq!(logits.dims(), &[2, 4, 3]);

        let probs = network.probabilities(&words, &preds).unwrap();
        let sums: Vec<Vec<f32>> = probs.sum(D::Minus1).unwrap().to_vec2().unwrap();
        for row in sums {
            for s in row {
                assert!((s - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_parameters_registered() {
        let provider = CorpusVocab::from_words(["a"], 4);
        let mut varmap = VarMap::new();
        Network::build(&schema(3, 4), &small_config(), &provider, &mut varmap, &Device::Cpu)
            .unwrap();

        let data = varmap.data().lock().unwrap();
        assert!(data.contains_key(EMBEDDING_WEIGHT));
        assert!(data.contains_key("lstm.weight_ih_l0"));
        assert!(data.contains_key("lstm.weight_ih_l1_reverse"));
        assert!(data.contains_key("dense.0.weight"));
        assert!(data.contains_key("classifier.bias"));
    }

    #[test]
    fn test_pretrained_embedding_is_loaded() {
        let glove = Glove::from_reader(Cursor::new("x 1 2\ny 3 4\n")).unwrap();
        let mut varmap = VarMap::new();
        Network::build(&schema(4, 2), &small_config(), &glove, &mut varmap, &Device::Cpu)
            .unwrap();

        let data = varmap.data().lock().unwrap();
        let weight: Vec<Vec<f32>> = data[EMBEDDING_WEIGHT].as_tensor().to_vec2().unwrap();
        assert_eq!(weight[3], vec![3.0, 4.0]);
    }

    #[test]
    fn test_frozen_embedding_is_not_a_variable() {
        let glove = Glove::from_reader(Cursor::new("x 1 2\ny 3 4\n")).unwrap();
        let mut varmap = VarMap::new();
        let config = small_config().with_trainable_emb(false);
        let network =
            Network::build(&schema(4, 2), &config, &glove, &mut varmap, &Device::Cpu).unwrap();

        assert!(!varmap.data().lock().unwrap().contains_key(EMBEDDING_WEIGHT));
        let frozen = network.embedding().frozen().data().lock().unwrap();
        let weight: Vec<Vec<f32>> = frozen[EMBEDDING_WEIGHT].as_tensor().to_vec2().unwrap();
        assert_eq!(weight[2], vec![1.0, 2.0]);
    }

    #[test]
    fn test_embedding_rejects_long_sequences() {
        let provider = CorpusVocab::from_words(["a", "b"], 3);
        let mut varmap = VarMap::new();
        let options = EmbeddingOptions::from_config(&small_config().with_sent_maxlen(3));
        let embedding =
            WordEmbedding::new(&provider, &schema(4, 3), options, &mut varmap, &Device::Cpu)
                .unwrap();
        assert_eq!(embedding.options().input_length, 3);

        let short = Tensor::new(&[[2u32, 3, 0]], &Device::Cpu).unwrap();
        assert_eq!(embedding.forward(&short, false).unwrap().dims(), &[1, 3, 3]);
        assert!(embedding.forward(&ids(&[[2, 3, 0, 0]]), false).is_err());
    }

    #[test]
    fn test_cross_entropy_ignores_padding() {
        let logits = Tensor::new(&[[[2.0f32, 0.0], [0.0, 5.0]]], &Device::Cpu).unwrap();
        let padded = Tensor::new(&[[[1.0f32, 0.0], [0.0, 0.0]]], &Device::Cpu).unwrap();
        let loss: f32 = categorical_cross_entropy(&logits, &padded)
            .unwrap()
            .to_scalar()
            .unwrap();
        let expected = -(2.0f32.exp() / (2.0f32.exp() + 1.0)).ln() / 2.0;
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_reverse_time() {
        let xs = Tensor::new(&[[[1.0f32], [2.0], [3.0]]], &Device::Cpu).unwrap();
        let rev: Vec<Vec<Vec<f32>>> = reverse_time(&xs).unwrap().to_vec3().unwrap();
        assert_eq!(rev, vec![vec![vec![3.0], vec![2.0], vec![1.0]]]);
    }
}
