use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Dropout, Embedding, Linear, VarBuilder, GRU, RNN};
use std::collections::HashMap;

/// A network mapping a `(batch, seq_len)` id tensor to `(batch, 2)` logits
/// ordered `[negative, positive]`.
pub trait SentimentNetwork: Send + Sync {
    fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor>;

    /// Move all parameters to `device`.
    fn to_device(&mut self, device: &Device) -> candle_core::Result<()>;

    /// Switch to inference mode (disables dropout).
    fn eval(&mut self);

    fn is_training(&self) -> bool;

    fn device(&self) -> &Device;

    fn architecture(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentiNNDims {
    pub input_size: usize,
    pub embed_size: usize,
    pub hidden_size: usize,
}

/// Embedding -> dropout -> single-layer GRU -> linear head over the final hidden state.
///
/// Parameter names follow the training-time layout: `e.weight`,
/// `rnn.{weight,bias}_{ih,hh}_l0`, `out.{weight,bias}`.
pub struct SentiNN {
    parameters: HashMap<String, Tensor>,
    dims: SentiNNDims,
    embedding: Embedding,
    dropout: Dropout,
    rnn: GRU,
    out: Linear,
    device: Device,
    training: bool,
}

impl SentiNN {
    pub const CLASS_NAME: &'static str = "SentiNN";
    pub const HOME_NAMESPACE: &'static str = "ml_model.model_architecture";
    const DROPOUT: f32 = 0.2;
    const NUM_CLASSES: usize = 2;

    pub fn qualified_name() -> String {
        format!("{}.{}", Self::HOME_NAMESPACE, Self::CLASS_NAME)
    }

    /// Builds the network from named parameters, inferring its sizes from their shapes.
    /// A freshly built network starts in training mode.
    pub fn from_parameters(
        parameters: HashMap<String, Tensor>,
        device: &Device,
    ) -> candle_core::Result<Self> {
        let dims = Self::infer_dims(&parameters)?;
        let vb = VarBuilder::from_tensors(parameters.clone(), DType::F32, device);

        let embedding = candle_nn::embedding(dims.input_size, dims.embed_size, vb.pp("e"))?;
        let rnn = candle_nn::gru(
            dims.embed_size,
            dims.hidden_size,
            candle_nn::GRUConfig::default(),
            vb.pp("rnn"),
        )?;
        let out = candle_nn::linear(dims.hidden_size, Self::NUM_CLASSES, vb.pp("out"))?;

        Ok(Self {
            parameters,
            dims,
            embedding,
            dropout: Dropout::new(Self::DROPOUT),
            rnn,
            out,
            device: device.clone(),
            training: true,
        })
    }

    pub fn dims(&self) -> SentiNNDims {
        self.dims
    }

    pub fn parameters(&self) -> &HashMap<String, Tensor> {
        &self.parameters
    }

    fn infer_dims(parameters: &HashMap<String, Tensor>) -> candle_core::Result<SentiNNDims> {
        let shape2 = |name: &str| -> candle_core::Result<(usize, usize)> {
            match parameters.get(name) {
                Some(t) => t.dims2(),
                None => candle_core::bail!("missing parameter '{name}'"),
            }
        };

        let (input_size, embed_size) = shape2("e.weight")?;
        let (gates, hidden_size) = shape2("rnn.weight_hh_l0")?;
        if gates != 3 * hidden_size {
            candle_core::bail!(
                "rnn.weight_hh_l0 has {gates} rows, expected {}",
                3 * hidden_size
            );
        }

        Ok(SentiNNDims {
            input_size,
            embed_size,
            hidden_size,
        })
    }
}

impl SentimentNetwork for SentiNN {
    fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        let x = self.embedding.forward(input)?;
        let x = self.dropout.forward(&x, self.training)?;
        let states = self.rnn.seq(&x)?;
        let hidden = match states.last() {
            Some(state) => state.h().clone(),
            None => candle_core::bail!("empty input sequence"),
        };
        self.out.forward(&hidden)
    }

    fn to_device(&mut self, device: &Device) -> candle_core::Result<()> {
        let training = self.training;
        let parameters = std::mem::take(&mut self.parameters);
        *self = Self::from_parameters(parameters, device)?;
        self.training = training;
        Ok(())
    }

    fn eval(&mut self) {
        self.training = false;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn architecture(&self) -> &'static str {
        Self::CLASS_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeros(shape: (usize, usize)) -> Tensor {
        Tensor::zeros(shape, DType::F32, &Device::Cpu).unwrap()
    }

    fn parameters(vocab: usize, embed: usize, hidden: usize) -> HashMap<String, Tensor> {
        let mut p = HashMap::new();
        p.insert("e.weight".to_string(), zeros((vocab, embed)));
        p.insert("rnn.weight_ih_l0".to_string(), zeros((3 * hidden, embed)));
        p.insert("rnn.weight_hh_l0".to_string(), zeros((3 * hidden, hidden)));
        p.insert(
            "rnn.bias_ih_l0".to_string(),
            Tensor::zeros(3 * hidden, DType::F32, &Device::Cpu).unwrap(),
        );
        p.insert(
            "rnn.bias_hh_l0".to_string(),
            Tensor::zeros(3 * hidden, DType::F32, &Device::Cpu).unwrap(),
        );
        p.insert("out.weight".to_string(), zeros((2, hidden)));
        p.insert(
            "out.bias".to_string(),
            Tensor::new(&[0.25f32, -0.25], &Device::Cpu).unwrap(),
        );
        p
    }

    #[test]
    fn test_dims_are_inferred_from_shapes() {
        let net = SentiNN::from_parameters(parameters(10, 4, 3), &Device::Cpu).unwrap();
        assert_eq!(
            net.dims(),
            SentiNNDims {
                input_size: 10,
                embed_size: 4,
                hidden_size: 3
            }
        );
        assert!(net.is_training());
    }

    #[test]
    fn test_forward_shape_and_bias_only_output() {
        let mut net = SentiNN::from_parameters(parameters(10, 4, 3), &Device::Cpu).unwrap();
        net.eval();
        let input = Tensor::new(&[[1u32, 2, 3, 2]], &Device::Cpu).unwrap();
        let logits = net.forward(&input).unwrap();
        assert_eq!(logits.dims(), &[1, 2]);
        let values = logits.squeeze(0).unwrap().to_vec1::<f32>().unwrap();
        assert!((values[0] - 0.25).abs() < 1e-6);
        assert!((values[1] + 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_missing_parameter_is_reported() {
        let mut p = parameters(10, 4, 3);
        p.remove("e.weight");
        let err = SentiNN::from_parameters(p, &Device::Cpu).err().unwrap();
        assert!(err.to_string().contains("e.weight"));
    }

    #[test]
    fn test_to_device_keeps_mode() {
        let mut net = SentiNN::from_parameters(parameters(10, 4, 3), &Device::Cpu).unwrap();
        net.eval();
        net.to_device(&Device::Cpu).unwrap();
        assert!(!net.is_training());
        assert_eq!(net.parameters().len(), 7);
    }
}
