//! # Padding and Truncation
//!
//! Brings a batch of variable-length sequences to one shared length. The
//! target length never exceeds the longest observed sequence, so asking for a
//! length of 100 over sentences of at most 12 tokens yields length 12.

use crate::error::{OieError, Result};

/// Resolve the length every sequence will be padded or truncated to.
///
/// `None` selects the longest observed length; otherwise the smaller of the
/// request and the longest observed length is used.
pub fn effective_length<T>(sequences: &[Vec<T>], maxlen: Option<usize>) -> Result<usize> {
    let max_observed = sequences
        .iter()
        .map(Vec::len)
        .max()
        .ok_or(OieError::EmptySequences)?;

    let length = match maxlen {
        None => {
            tracing::debug!("Padding to maximum observed length ({})", max_observed);
            max_observed
        }
        Some(requested) => {
            let length = requested.min(max_observed);
            tracing::debug!(
                "Padding / truncating to {} tokens (max observed was {})",
                length,
                max_observed
            );
            length
        }
    };

    Ok(length)
}

/// Pad and truncate `sequences` to a common length.
///
/// Sequences longer than the effective length keep their leading elements;
/// shorter ones are extended on the right with values produced by `pad`.
///
/// # Examples
/// ```
/// use rnn_oie_core::padding::pad_sequences;
///
/// let padded = pad_sequences(&[vec![1, 2, 3], vec![4, 5]], Some(2), || 0).unwrap();
/// assert_eq!(padded, vec![vec![1, 2], vec![4, 5]]);
/// ```
pub fn pad_sequences<T, F>(
    sequences: &[Vec<T>],
    maxlen: Option<usize>,
    mut pad: F,
) -> Result<Vec<Vec<T>>>
where
    T: Clone,
    F: FnMut() -> T,
{
    let length = effective_length(sequences, maxlen)?;

    Ok(sequences
        .iter()
        .map(|sequence| {
            let mut padded: Vec<T> = sequence.iter().take(length).cloned().collect();
            padded.resize_with(length, &mut pad);
            padded
        })
        .collect())
}
