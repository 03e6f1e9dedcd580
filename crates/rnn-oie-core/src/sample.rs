//! # Token Samples
//!
//! A sample names one position of an encoded sentence. Padding is not a
//! separate type: it is the sample holding the reserved index `0`.

/// A single encoded token: its index in the embedding vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sample {
    word: u32,
}

impl Sample {
    /// Index reserved for padding positions.
    pub const PAD_INDEX: u32 = 0;

    /// The padding sentinel.
    pub const PAD: Sample = Sample {
        word: Self::PAD_INDEX,
    };

    /// Wrap an embedding index.
    pub fn new(word: u32) -> Self {
        Self { word }
    }

    /// Factory for padding positions, usable as a `pad_sequences` filler.
    pub fn pad() -> Self {
        Self::PAD
    }

    /// Whether this sample is the padding sentinel.
    pub fn is_pad(&self) -> bool {
        self.word == Self::PAD_INDEX
    }

    /// Encode this sample as the numeric input of the network.
    pub fn encode(&self) -> u32 {
        self.word
    }
}

impl From<u32> for Sample {
    fn from(word: u32) -> Self {
        Self::new(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_encodes_to_zero() {
        assert_eq!(Sample::pad().encode(), 0);
        assert!(Sample::PAD.is_pad());
        assert_eq!(Sample::default(), Sample::PAD);
    }

    #[test]
    fn test_token_encodes_its_index() {
        let sample = Sample::new(42);
        assert_eq!(sample.encode(), 42);
        assert!(!sample.is_pad());
        assert_eq!(Sample::from(7), Sample::new(7));
    }
}
