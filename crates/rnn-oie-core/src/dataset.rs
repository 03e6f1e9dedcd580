//! # Supervised Open IE Datasets
//!
//! Loads a delimited table with one row per (sentence, token) pair, groups the
//! rows into sentences and encodes them into aligned, fixed-length inputs and
//! one-hot outputs.
//!
//! Sentences are taken from `run_id` values `min..max`, so the sentence with
//! the largest id is left out of every loaded dataset unless
//! [`LoaderConfig::include_last_group`] is set.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::embedding::{sample_of, EmbeddingProvider};
use crate::error::{OieError, Result};
use crate::padding::pad_sequences;
use crate::sample::Sample;
use crate::table::Table;
use crate::vocab::{LabelVocabulary, VocabVersion};

/// Options for reading and encoding a dataset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Field separator.
    pub sep: char,
    /// Pad / truncate sentences to at most this many tokens.
    pub sent_maxlen: Option<usize>,
    /// Column holding the sentence id.
    pub group_column: String,
    /// Column holding the token.
    pub word_column: String,
    /// Column holding the predicate token of the row's extraction.
    pub predicate_column: String,
    /// Column holding the gold tag.
    pub label_column: String,
    /// Keep the sentence with the largest id.
    pub include_last_group: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            sep: '\t',
            sent_maxlen: None,
            group_column: "run_id".into(),
            word_column: "word".into(),
            predicate_column: "pred".into(),
            label_column: "label".into(),
            include_last_group: false,
        }
    }
}

impl LoaderConfig {
    /// Create a loader configuration with default column names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the field separator.
    pub fn with_sep(mut self, sep: char) -> Self {
        self.sep = sep;
        self
    }

    /// Set the maximum sentence length.
    pub fn with_sent_maxlen(mut self, sent_maxlen: Option<usize>) -> Self {
        self.sent_maxlen = sent_maxlen;
        self
    }

    /// Keep or drop the sentence with the largest id.
    pub fn with_last_group(mut self, include: bool) -> Self {
        self.include_last_group = include;
        self
    }
}

/// How the label column is mapped to class indices.
#[derive(Debug, Clone, Copy)]
pub enum LabelPolicy<'a> {
    /// Fit a fresh vocabulary on this file's labels.
    Fit,
    /// Encode with an existing vocabulary; unseen labels are an error.
    Frozen(&'a LabelVocabulary),
}

/// Rows of the source table that make up one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceGroup {
    /// The sentence id shared by the rows.
    pub id: i64,
    /// Row indices, in file order.
    pub rows: Vec<usize>,
}

/// Word and predicate indices for every sentence, padded to one length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInput {
    pub word_inputs: Vec<Vec<u32>>,
    pub predicate_inputs: Vec<Vec<u32>>,
}

impl EncodedInput {
    /// Number of sentences.
    pub fn sentences(&self) -> usize {
        self.word_inputs.len()
    }

    /// Length every sentence was padded or truncated to.
    pub fn padded_len(&self) -> usize {
        self.word_inputs.first().map_or(0, Vec::len)
    }
}

/// One-hot gold labels for every sentence; padding positions are all zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedOutput {
    pub vocab_version: VocabVersion,
    pub num_classes: usize,
    pub labels: Vec<Vec<Vec<f32>>>,
}

impl EncodedOutput {
    /// Number of sentences.
    pub fn sentences(&self) -> usize {
        self.labels.len()
    }

    /// Length every sentence was padded or truncated to.
    pub fn padded_len(&self) -> usize {
        self.labels.first().map_or(0, Vec::len)
    }

    /// Gold class at `(sentence, position)`, or `None` on padding.
    pub fn class_at(&self, sentence: usize, position: usize) -> Option<usize> {
        self.labels
            .get(sentence)?
            .get(position)?
            .iter()
            .position(|&v| v > 0.0)
    }
}

/// A loaded, encoded dataset file.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub inputs: EncodedInput,
    pub outputs: EncodedOutput,
    pub vocabulary: LabelVocabulary,
    pub groups: Vec<SentenceGroup>,
}

impl Dataset {
    /// Read and encode the dataset at `path`.
    pub fn load<P: AsRef<Path>>(
        path: P,
        config: &LoaderConfig,
        embedding: &dyn EmbeddingProvider,
        policy: LabelPolicy<'_>,
    ) -> Result<Self> {
        let table = Table::read(path, config.sep)?;
        Self::from_table(&table, config, embedding, policy)
    }

    /// Encode an already parsed table.
    pub fn from_table(
        table: &Table,
        config: &LoaderConfig,
        embedding: &dyn EmbeddingProvider,
        policy: LabelPolicy<'_>,
    ) -> Result<Self> {
        let vocabulary = match policy {
            LabelPolicy::Fit => LabelVocabulary::fit(table.column(&config.label_column)?),
            LabelPolicy::Frozen(vocab) => vocab.clone(),
        };
        tracing::debug!(
            "Classes: ({}, {:?})",
            vocabulary.len(),
            vocabulary.classes()
        );

        let groups = sentence_groups(table, config)?;
        let inputs = encode_inputs(table, &groups, config, embedding)?;
        let outputs = encode_outputs(table, &groups, config, &vocabulary)?;

        Ok(Self {
            inputs,
            outputs,
            vocabulary,
            groups,
        })
    }

    /// Number of encoded sentences.
    pub fn len(&self) -> usize {
        self.inputs.sentences()
    }

    /// Whether no sentence was encoded.
    pub fn is_empty(&self) -> bool {
        self.inputs.sentences() == 0
    }
}

/// Split table rows into sentences by their group id.
///
/// Groups come out in ascending id order. The group with the largest id is
/// dropped unless `config.include_last_group` is set.
pub fn sentence_groups(table: &Table, config: &LoaderConfig) -> Result<Vec<SentenceGroup>> {
    let col = table.column_index(&config.group_column)?;

    let mut by_id: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for row in 0..table.len() {
        let raw = table.get(row, col).unwrap_or_default();
        let id = raw.trim().parse::<i64>().map_err(|_| OieError::MalformedRow {
            line: table.line_of(row),
            reason: format!("{} {:?} is not an integer", config.group_column, raw),
        })?;
        by_id.entry(id).or_default().push(row);
    }

    let Some(&max) = by_id.keys().next_back() else {
        return Ok(Vec::new());
    };
    if !config.include_last_group {
        tracing::debug!("Sentence {} is outside the group range and is dropped", max);
        by_id.remove(&max);
    }

    let groups: Vec<SentenceGroup> = by_id
        .into_iter()
        .map(|(id, rows)| SentenceGroup { id, rows })
        .collect();

    Ok(groups)
}

/// Encode words and predicates of every group as padded embedding indices.
pub fn encode_inputs(
    table: &Table,
    groups: &[SentenceGroup],
    config: &LoaderConfig,
    embedding: &dyn EmbeddingProvider,
) -> Result<EncodedInput> {
    let word_col = table.column_index(&config.word_column)?;
    let pred_col = table.column_index(&config.predicate_column)?;

    let encode_column = |col: usize| -> Vec<Vec<Sample>> {
        groups
            .iter()
            .map(|group| {
                group
                    .rows
                    .iter()
                    .map(|&row| sample_of(embedding, table.get(row, col).unwrap_or_default()))
                    .collect()
            })
            .collect()
    };

    let word_samples = encode_column(word_col);
    let pred_samples = encode_column(pred_col);

    let encode = |samples: Vec<Vec<Sample>>| -> Vec<Vec<u32>> {
        samples
            .into_iter()
            .map(|sent| sent.iter().map(Sample::encode).collect())
            .collect()
    };

    Ok(EncodedInput {
        word_inputs: encode(pad_sequences(&word_samples, config.sent_maxlen, Sample::pad)?),
        predicate_inputs: encode(pad_sequences(&pred_samples, config.sent_maxlen, Sample::pad)?),
    })
}

/// One-hot encode the gold label of every row of every group, padded with
/// all-zero vectors.
pub fn encode_outputs(
    table: &Table,
    groups: &[SentenceGroup],
    config: &LoaderConfig,
    vocabulary: &LabelVocabulary,
) -> Result<EncodedOutput> {
    let label_col = table.column_index(&config.label_column)?;
    let num_classes = vocabulary.len();

    let encodings = groups
        .iter()
        .map(|group| {
            group
                .rows
                .iter()
                .map(|&row| vocabulary.one_hot(table.get(row, label_col).unwrap_or_default()))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(EncodedOutput {
        vocab_version: vocabulary.version(),
        num_classes,
        labels: pad_sequences(&encodings, config.sent_maxlen, || vec![0.0; num_classes])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{CorpusVocab, UNKNOWN_INDEX};
    use std::io::Cursor;

    const TRAIN: &str = "\
run_id\tword\tpred\tlabel
0\tJohn\tsaw\tA0-B
0\tsaw\tsaw\tP-B
0\tMary\tsaw\tA1-B
1\tBirds\tfly\tA0-B
1\tfly\tfly\tP-B
2\tIt\trains\tO
2\trains\trains\tP-B
";

    fn table(input: &str) -> Table {
        Table::parse(Cursor::new(input), '\t').unwrap()
    }

    fn embedding(table: &Table) -> CorpusVocab {
        CorpusVocab::from_table(table, &["word", "pred"], 4).unwrap()
    }

    #[test]
    fn test_largest_group_is_dropped() {
        let table = table(TRAIN);
        let groups = sentence_groups(&table, &LoaderConfig::default()).unwrap();
        let ids: Vec<i64> = groups.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(groups[0].rows, vec![0, 1, 2]);
    }

    #[test]
    fn test_include_last_group() {
        let table = table(TRAIN);
        let config = LoaderConfig::default().with_last_group(true);
        let groups = sentence_groups(&table, &config).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2].rows, vec![5, 6]);
    }

    #[test]
    fn test_gaps_and_interleaved_rows() {
        let table = table(
            "run_id\tword\tpred\tlabel\n3\ta\ta\tO\n0\tb\tb\tO\n3\tc\tc\tO\n7\td\td\tO\n",
        );
        let groups = sentence_groups(&table, &LoaderConfig::default()).unwrap();
        assert_eq!(
            groups,
            vec![
                SentenceGroup { id: 0, rows: vec![1] },
                SentenceGroup { id: 3, rows: vec![0, 2] },
            ]
        );
    }

    #[test]
    fn test_sparse_ids_do_not_scan_the_id_range() {
        let table = table(
            "run_id\tword\tpred\tlabel\n0\ta\ta\tO\n1\tb\tb\tO\n300000000\tc\tc\tO\n\
             -5000000000\td\td\tO\n",
        );
        let start = std::time::Instant::now();
        let groups = sentence_groups(&table, &LoaderConfig::default()).unwrap();
        assert!(start.elapsed() < std::time::Duration::from_secs(1));

        let ids: Vec<i64> = groups.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![-5_000_000_000, 0, 1]);
    }

    #[test]
    fn test_largest_possible_id() {
        let input = format!("run_id\tword\tpred\tlabel\n0\ta\ta\tO\n{}\tb\tb\tO\n", i64::MAX);
        let table = table(&input);

        let groups = sentence_groups(&table, &LoaderConfig::default()).unwrap();
        assert_eq!(groups.len(), 1);

        let config = LoaderConfig::default().with_last_group(true);
        let groups = sentence_groups(&table, &config).unwrap();
        let ids: Vec<i64> = groups.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![0, i64::MAX]);
    }

    #[test]
    fn test_non_integer_group_id() {
        let table = table("run_id\tword\tpred\tlabel\nx\ta\ta\tO\n");
        let err = sentence_groups(&table, &LoaderConfig::default()).unwrap_err();
        assert!(matches!(err, OieError::MalformedRow { line: 2, .. }));
    }

    #[test]
    fn test_inputs_and_outputs_are_aligned() {
        let table = table(TRAIN);
        let emb = embedding(&table);
        let dataset =
            Dataset::from_table(&table, &LoaderConfig::default(), &emb, LabelPolicy::Fit).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.inputs.sentences(), dataset.outputs.sentences());
        assert_eq!(dataset.inputs.padded_len(), 3);
        assert_eq!(dataset.outputs.padded_len(), 3);
        assert_eq!(dataset.inputs.predicate_inputs[0].len(), 3);

        let saw = emb.word_index("saw");
        assert_eq!(dataset.inputs.word_inputs[0][1], saw);
        assert_eq!(dataset.inputs.predicate_inputs[0], vec![saw, saw, saw]);
        assert_eq!(dataset.inputs.word_inputs[1][2], Sample::PAD_INDEX);

        // Label vocabulary is fit on the whole column, dropped sentence included.
        assert_eq!(dataset.vocabulary.classes(), &["A0-B", "A1-B", "O", "P-B"]);
        assert_eq!(dataset.outputs.class_at(0, 2), Some(1));
        assert_eq!(dataset.outputs.class_at(1, 1), Some(3));
        assert_eq!(dataset.outputs.class_at(1, 2), None);
        assert_eq!(dataset.outputs.labels[1][2], vec![0.0; 4]);
    }

    #[test]
    fn test_truncation_applies_to_both_sides() {
        let table = table(TRAIN);
        let emb = embedding(&table);
        let config = LoaderConfig::default().with_sent_maxlen(Some(2));
        let dataset = Dataset::from_table(&table, &config, &emb, LabelPolicy::Fit).unwrap();
        assert_eq!(dataset.inputs.padded_len(), 2);
        assert_eq!(dataset.outputs.padded_len(), 2);
        assert_eq!(dataset.outputs.class_at(0, 1), Some(3));
    }

    #[test]
    fn test_unknown_words_map_to_unknown_index() {
        let train = table(TRAIN);
        let emb = CorpusVocab::from_words(["John"], 4);
        let dataset =
            Dataset::from_table(&train, &LoaderConfig::default(), &emb, LabelPolicy::Fit).unwrap();
        assert_eq!(dataset.inputs.word_inputs[0][0], 2);
        assert_eq!(dataset.inputs.word_inputs[0][1], UNKNOWN_INDEX);
    }

    #[test]
    fn test_frozen_vocabulary() {
        let train = table(TRAIN);
        let emb = embedding(&train);
        let vocab = LabelVocabulary::fit(["A0-B", "A1-B", "O", "P-B", "A2-B"]);
        let dataset = Dataset::from_table(
            &train,
            &LoaderConfig::default(),
            &emb,
            LabelPolicy::Frozen(&vocab),
        )
        .unwrap();
        assert_eq!(dataset.outputs.vocab_version, vocab.version());
        assert_eq!(dataset.outputs.num_classes, 5);

        let narrow = LabelVocabulary::fit(["O", "P-B"]);
        let err = Dataset::from_table(
            &train,
            &LoaderConfig::default(),
            &emb,
            LabelPolicy::Frozen(&narrow),
        )
        .unwrap_err();
        assert!(matches!(err, OieError::UnknownLabel(_)));
    }

    #[test]
    fn test_single_sentence_file_is_empty() {
        let table = table("run_id\tword\tpred\tlabel\n0\ta\ta\tO\n");
        let emb = embedding(&table);
        let err = Dataset::from_table(&table, &LoaderConfig::default(), &emb, LabelPolicy::Fit)
            .unwrap_err();
        assert!(matches!(err, OieError::EmptySequences));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        std::fs::write(&path, TRAIN.replace('\t', ",")).unwrap();
        let train = table(TRAIN);
        let emb = embedding(&train);
        let config = LoaderConfig::default().with_sep(',');
        let dataset = Dataset::load(&path, &config, &emb, LabelPolicy::Fit).unwrap();
        assert_eq!(dataset.groups.len(), 2);
    }
}
