use candle_core::{Device, Tensor};

/// Longest token prefix fed to the model; one extra slot holds `<eos>`.
pub const MAX_SEQ_LEN: usize = 256;
pub const EOS_ID: u32 = 1;
pub const PAD_ID: u32 = 2;

/// Fixed-shape model input: always `max_seq_len + 1` ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInput(Vec<u32>);

impl EncodedInput {
    pub fn ids(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_ids(self) -> Vec<u32> {
        self.0
    }

    /// Batch of one: shape `(1, len)`.
    pub fn to_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        Tensor::new(self.0.as_slice(), device)?.unsqueeze(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceEncoder {
    max_seq_len: usize,
    eos_id: u32,
    pad_id: u32,
}

impl Default for SequenceEncoder {
    fn default() -> Self {
        Self::new(MAX_SEQ_LEN)
    }
}

impl SequenceEncoder {
    pub fn new(max_seq_len: usize) -> Self {
        Self {
            max_seq_len,
            eos_id: EOS_ID,
            pad_id: PAD_ID,
        }
    }

    pub fn output_len(&self) -> usize {
        self.max_seq_len + 1
    }

    /// Truncate, append `<eos>`, then right-pad with `<pad>`.
    pub fn encode(&self, token_ids: &[u32]) -> EncodedInput {
        let kept = token_ids.len().min(self.max_seq_len);
        let mut ids = Vec::with_capacity(self.output_len());
        ids.extend_from_slice(&token_ids[..kept]);
        ids.push(self.eos_id);
        ids.resize(self.output_len(), self.pad_id);
        EncodedInput(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_all_sentinels() {
        let encoded = SequenceEncoder::default().encode(&[]);
        assert_eq!(encoded.len(), MAX_SEQ_LEN + 1);
        assert_eq!(encoded.ids()[0], EOS_ID);
        assert!(encoded.ids()[1..].iter().all(|&id| id == PAD_ID));
    }

    #[test]
    fn test_short_input_is_padded_after_eos() {
        let encoded = SequenceEncoder::new(6).encode(&[7, 8, 9]);
        assert_eq!(encoded.ids(), &[7, 8, 9, EOS_ID, PAD_ID, PAD_ID, PAD_ID]);
    }

    #[test]
    fn test_exact_fit_has_no_padding() {
        let encoded = SequenceEncoder::new(3).encode(&[7, 8, 9]);
        assert_eq!(encoded.ids(), &[7, 8, 9, EOS_ID]);
    }

    #[test]
    fn test_long_input_truncates_before_eos() {
        let long: Vec<u32> = (10..10 + 2 * MAX_SEQ_LEN as u32).collect();
        let encoded = SequenceEncoder::default().encode(&long);
        assert_eq!(encoded.len(), MAX_SEQ_LEN + 1);
        assert_eq!(&encoded.ids()[..MAX_SEQ_LEN], &long[..MAX_SEQ_LEN]);
        assert_eq!(encoded.ids()[MAX_SEQ_LEN], EOS_ID);
    }

    #[test]
    fn test_tensor_shape() {
        let encoded = SequenceEncoder::new(4).encode(&[5]);
        let tensor = encoded.to_tensor(&Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[1, 5]);
    }
}
