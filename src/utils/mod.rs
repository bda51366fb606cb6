//! Utility functions for the recognition network.
//!
//! This module provides image loading, Candle device and error helpers, and
//! logging setup.

pub mod candle;
pub mod image;

pub use self::candle::{candle_to_ocr_inference, candle_to_ocr_processing, parse_device};
pub use self::image::{dynamic_to_rgb, load_image, load_images, rgb_to_gray};

/// Initializes the tracing subscriber for logging.
///
/// This function sets up the tracing subscriber with environment filter and formatting layer.
/// It's typically called at the start of an application to enable logging.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
