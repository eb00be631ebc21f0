pub mod constants;
pub mod features;
pub mod mfcc;
pub mod preprocessing;
pub use features::{FeatureExtractor, FeatureSequence, coefficient_names};
pub use preprocessing::load_audio;
