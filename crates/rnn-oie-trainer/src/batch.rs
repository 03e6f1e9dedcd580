//! Mini-batch tensors for the tagger.

use candle_core::{Device, Result, Tensor};
use oorandom::Rand32;
use rnn_oie_core::{EncodedInput, EncodedOutput};

/// Input tensors for a set of sentences.
pub struct Batch {
    /// Word ids, `[batch, len]`.
    pub words: Tensor,
    /// Predicate ids, `[batch, len]`.
    pub predicates: Tensor,
}

/// A batch together with its gold labels.
pub struct LabelledBatch {
    pub batch: Batch,
    /// One-hot gold labels, `[batch, len, num_classes]`.
    pub targets: Tensor,
}

impl Batch {
    /// Gather the inputs of the sentences at `indices`.
    pub fn inputs(inputs: &EncodedInput, indices: &[usize], device: &Device) -> Result<Self> {
        Ok(Self {
            words: id_tensor(&inputs.word_inputs, indices, device)?,
            predicates: id_tensor(&inputs.predicate_inputs, indices, device)?,
        })
    }

    /// Gather inputs and gold labels of the sentences at `indices`.
    pub fn labelled(
        inputs: &EncodedInput,
        outputs: &EncodedOutput,
        indices: &[usize],
        device: &Device,
    ) -> Result<LabelledBatch> {
        Ok(LabelledBatch {
            batch: Self::inputs(inputs, indices, device)?,
            targets: target_tensor(outputs, indices, device)?,
        })
    }
}

fn id_tensor(rows: &[Vec<u32>], indices: &[usize], device: &Device) -> Result<Tensor> {
    let len = indices.first().map_or(0, |&i| rows[i].len());
    let flat: Vec<u32> = indices
        .iter()
        .flat_map(|&i| rows[i].iter().copied())
        .collect();
    Tensor::from_vec(flat, (indices.len(), len), device)
}

fn target_tensor(outputs: &EncodedOutput, indices: &[usize], device: &Device) -> Result<Tensor> {
    let len = indices.first().map_or(0, |&i| outputs.labels[i].len());
    let flat: Vec<f32> = indices
        .iter()
        .flat_map(|&i| outputs.labels[i].iter().flatten().copied())
        .collect();
    Tensor::from_vec(flat, (indices.len(), len, outputs.num_classes), device)
}

/// Sentence indices `0..count` split into batches of at most `batch_size`, in order.
pub fn sequential_batches(count: usize, batch_size: usize) -> Vec<Vec<usize>> {
    let order: Vec<usize> = (0..count).collect();
    order
        .chunks(batch_size.max(1))
        .map(<[usize]>::to_vec)
        .collect()
}

/// Sentence indices `0..count` shuffled with `rng` and split into batches.
pub fn shuffled_batches(count: usize, batch_size: usize, rng: &mut Rand32) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..count).collect();
    for i in (1..order.len()).rev() {
        let j = rng.rand_range(0..(i as u32 + 1)) as usize;
        order.swap(i, j);
    }
    order
        .chunks(batch_size.max(1))
        .map(<[usize]>::to_vec)
        .collect()
}
