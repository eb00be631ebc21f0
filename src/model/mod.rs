// Model architecture, training and persistence

pub mod classifier;
pub mod config;
pub mod conv_block;
pub mod store;
pub mod train;

pub use classifier::SequenceClassifier;
pub use config::ClassifierConfig;
pub use train::{TrainingReport, fit, train_in_background, train_model};
