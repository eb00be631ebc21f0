use burn::config::Config;

/// Layer sizes of the CNN-BiLSTM classifier.
///
/// The defaults are the trained topology; persisted models only load into a
/// network built from the same values.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Cepstral coefficients per frame (input channels), `N_MFCC`
    #[config(default = 40)]
    pub n_features: usize,

    /// Filters of the first and second convolution
    #[config(default = 32)]
    pub conv1_filters: usize,
    #[config(default = 64)]
    pub conv2_filters: usize,

    #[config(default = 3)]
    pub kernel_size: usize,

    /// Max-pool window, also used as its stride
    #[config(default = 2)]
    pub pool_size: usize,

    /// Hidden units per direction of the two recurrent layers
    #[config(default = 64)]
    pub lstm1_hidden: usize,
    #[config(default = 32)]
    pub lstm2_hidden: usize,

    #[config(default = "0.3")]
    pub dropout: f64,

    #[config(default = 32)]
    pub dense_hidden: usize,

    /// [low risk, high risk]
    #[config(default = 2)]
    pub n_classes: usize,
}

impl ClassifierConfig {
    /// Sequence length reaching the recurrent layers for `input_len` frames,
    /// or `None` if the convolutions and pools consume the whole sequence.
    ///
    /// Convolutions are unpadded (`len - kernel + 1`) and pools drop the
    /// remainder (`len / pool`).
    pub fn recurrent_len(&self, input_len: usize) -> Option<usize> {
        let after_block = |len: usize| -> Option<usize> {
            let conv = len.checked_sub(self.kernel_size - 1)?;
            let pooled = conv / self.pool_size;
            (pooled > 0).then_some(pooled)
        };
        after_block(input_len).and_then(after_block)
    }

    /// Shortest input the default topology accepts.
    pub fn min_sequence_len() -> usize {
        let config = Self::new();
        (1..)
            .find(|&len| config.recurrent_len(len).is_some())
            .unwrap_or(usize::MAX)
    }
}
