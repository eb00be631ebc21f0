use burn::{
    module::Module,
    nn::{
        BatchNorm, BatchNormConfig, Relu,
        conv::{Conv1d, Conv1dConfig},
        pool::{MaxPool1d, MaxPool1dConfig},
    },
    tensor::{Tensor, backend::Backend},
};

/// Convolution front-end block: Conv1d → ReLU → MaxPool → BatchNorm.
///
/// Works on `[batch, channels, time]`. The convolution is unpadded and the
/// pool stride equals its window, so time shrinks to `(time - kernel + 1) / pool`.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv1d<B>,
    activation: Relu,
    pool: MaxPool1d,
    norm: BatchNorm<B>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        channels_in: usize,
        channels_out: usize,
        kernel_size: usize,
        pool_size: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            conv: Conv1dConfig::new(channels_in, channels_out, kernel_size).init(device),
            activation: Relu::new(),
            pool: MaxPool1dConfig::new(pool_size)
                .with_stride(pool_size)
                .init(),
            norm: BatchNormConfig::new(channels_out).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.activation.forward(self.conv.forward(x));
        let x = self.pool.forward(x);
        self.norm.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_conv_block_shape() {
        let device = Default::default();
        let block = ConvBlock::<TestBackend>::new(40, 32, 3, 2, &device);

        // [batch=2, channels=40, time=100]
        let input = Tensor::<TestBackend, 3>::random(
            [2, 40, 100],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        // 100 -> conv 98 -> pool 49
        assert_eq!(block.forward(input).shape().dims, [2, 32, 49]);
    }
}
