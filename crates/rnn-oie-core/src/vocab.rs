//! # Label Vocabulary
//!
//! Maps textual chunk tags (`A0-B`, `P-B`, `O`, ...) to dense class indices.
//! Classes are kept in lexicographic order so a label set always produces the
//! same indices, and every vocabulary is stamped with a fingerprint of its
//! classes. Encoded values carry that stamp; decoding checks it, so indices
//! produced under one label set are never read back through another.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OieError, Result};

/// Fingerprint of a label vocabulary's class list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VocabVersion(pub u64);

impl fmt::Display for VocabVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A frozen bijection between labels and class indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelVocabulary {
    classes: Vec<String>,
    index: HashMap<String, usize>,
    version: VocabVersion,
}

impl LabelVocabulary {
    /// Fit a vocabulary on every label in `labels`; duplicates are collapsed.
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes: BTreeSet<String> = labels
            .into_iter()
            .map(|label| label.as_ref().to_string())
            .collect();
        Self::from(classes.into_iter().collect::<Vec<_>>())
    }

    /// The version stamp of this vocabulary.
    pub fn version(&self) -> VocabVersion {
        self.version
    }

    /// All classes, ordered by class index.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the vocabulary has no classes.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class index of `label`.
    pub fn encode(&self, label: &str) -> Result<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| OieError::UnknownLabel(label.to_string()))
    }

    /// One-hot vector for `label`.
    pub fn one_hot(&self, label: &str) -> Result<Vec<f32>> {
        let mut encoded = vec![0.0f32; self.len()];
        encoded[self.encode(label)?] = 1.0;
        Ok(encoded)
    }

    /// Map a class index back to its label.
    ///
    /// `version` is the stamp carried by the value being decoded and must
    /// match this vocabulary.
    pub fn decode(&self, version: VocabVersion, index: usize) -> Result<&str> {
        self.check_version(version)?;
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(OieError::UnknownClass {
                index,
                num_classes: self.len(),
            })
    }

    /// Fail unless `version` was produced by this vocabulary.
    pub fn check_version(&self, version: VocabVersion) -> Result<()> {
        if version != self.version {
            return Err(OieError::VocabularyMismatch {
                expected: self.version.0,
                found: version.0,
            });
        }
        Ok(())
    }
}

impl From<Vec<String>> for LabelVocabulary {
    fn from(classes: Vec<String>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i))
            .collect();
        let version = fingerprint(&classes);
        Self {
            classes,
            index,
            version,
        }
    }
}

impl From<LabelVocabulary> for Vec<String> {
    fn from(vocab: LabelVocabulary) -> Self {
        vocab.classes
    }
}

/// FNV-1a over the class list, with a separator byte between classes.
fn fingerprint(classes: &[String]) -> VocabVersion {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for class in classes {
        for byte in class.bytes().chain(std::iter::once(0xff)) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(PRIME);
        }
    }
    VocabVersion(hash)
}
