//! Text recognition network: configuration and the assembled four-stage model.

pub mod config;
pub mod model;

pub use config::RecognitionModelConfig;
pub use model::TextRecognitionModel;
