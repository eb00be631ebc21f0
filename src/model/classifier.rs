use burn::{
    module::Module,
    nn::{BiLstm, BiLstmConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{Tensor, activation::softmax, backend::Backend},
};

use crate::model::{config::ClassifierConfig, conv_block::ConvBlock};

/// CNN-BiLSTM depression risk classifier.
///
///   MFCC sequence [batch, time, 40]
///   → 2 × (Conv1d → ReLU → MaxPool → BatchNorm)   local spectral patterns
///   → BiLSTM(64) full sequence → Dropout
///   → BiLSTM(32) final states → Dropout           temporal context
///   → Dense(32, ReLU) → Dense(2)                  logits [low, high]
#[derive(Module, Debug)]
pub struct SequenceClassifier<B: Backend> {
    block1: ConvBlock<B>,
    block2: ConvBlock<B>,
    lstm1: BiLstm<B>,
    dropout1: Dropout,
    lstm2: BiLstm<B>,
    dropout2: Dropout,
    dense: Linear<B>,
    activation: Relu,
    output: Linear<B>,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SequenceClassifier<B> {
        SequenceClassifier {
            block1: ConvBlock::new(
                self.n_features,
                self.conv1_filters,
                self.kernel_size,
                self.pool_size,
                device,
            ),
            block2: ConvBlock::new(
                self.conv1_filters,
                self.conv2_filters,
                self.kernel_size,
                self.pool_size,
                device,
            ),
            lstm1: BiLstmConfig::new(self.conv2_filters, self.lstm1_hidden, true).init(device),
            dropout1: DropoutConfig::new(self.dropout).init(),
            // lstm1 concatenates both directions
            lstm2: BiLstmConfig::new(2 * self.lstm1_hidden, self.lstm2_hidden, true).init(device),
            dropout2: DropoutConfig::new(self.dropout).init(),
            dense: LinearConfig::new(2 * self.lstm2_hidden, self.dense_hidden).init(device),
            activation: Relu::new(),
            output: LinearConfig::new(self.dense_hidden, self.n_classes).init(device),
        }
    }
}

impl<B: Backend> SequenceClassifier<B> {
    /// Forward pass.
    ///
    /// # Arguments
    /// * `features` - MFCC sequences [batch, time, n_features]
    ///
    /// # Returns
    /// Unnormalised class scores [batch, n_classes]
    pub fn forward(&self, features: Tensor<B, 3>) -> Tensor<B, 2> {
        // Convolutions run over time with the coefficients as channels
        let x = features.swap_dims(1, 2);
        let x = self.block1.forward(x);
        let x = self.block2.forward(x);

        // Back to [batch, time', channels] for the recurrent layers
        let x = x.swap_dims(1, 2);

        let (x, _) = self.lstm1.forward(x, None);
        let x = self.dropout1.forward(x);

        let (x, _) = self.lstm2.forward(x, None);
        let x = final_states(x);
        let x = self.dropout2.forward(x);

        let x = self.activation.forward(self.dense.forward(x));
        self.output.forward(x)
    }

    /// Class probabilities `[P(low), P(high)]` per example, summing to 1.
    pub fn probabilities(&self, features: Tensor<B, 3>) -> Tensor<B, 2> {
        softmax(self.forward(features), 1)
    }
}

/// Final hidden state of each direction of a bidirectional output sequence.
///
/// The forward direction finishes at the last time step, the backward
/// direction at the first. `x` is `[batch, time, 2 * hidden]` with the
/// forward half first; the result is `[batch, 2 * hidden]`.
fn final_states<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch, time, width] = x.dims();
    let hidden = width / 2;

    let forward_last = x
        .clone()
        .slice([0..batch, (time - 1)..time, 0..hidden])
        .reshape([batch, hidden]);
    let backward_first = x
        .slice([0..batch, 0..1, hidden..width])
        .reshape([batch, hidden]);

    Tensor::cat(vec![forward_last, backward_first], 1)
}
