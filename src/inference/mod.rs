pub mod predict;
pub use predict::{InferencePipeline, PredictionResult, decide};
