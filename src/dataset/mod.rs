pub mod builder;
pub mod labels;
pub use builder::{DatasetBuilder, LabeledExample, TrainingBatch};
pub use labels::{DatasetSummary, LabelTable, RiskLabel};
