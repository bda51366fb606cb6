//! Text Recognition Example
//!
//! Loads a recognition checkpoint, recognizes the text in the given word crops
//! and logs the recognized text with its confidence.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example text_recognition -- [OPTIONS] --weights <WEIGHTS> <IMAGES>...
//! ```
//!
//! # Arguments
//!
//! * `-w, --weights` - Path to the safetensors checkpoint
//! * `-c, --config` - Optional JSON model configuration
//! * `-d, --char-dict-path` - Optional character dictionary (one character per line)
//! * `--transformation`, `--feature-extraction`, `--sequence-modeling`, `--prediction` -
//!   Stage selectors overriding the configuration
//! * `--keep-ratio` - Keep the aspect ratio of the crops and pad on the right
//! * `--device` - Device to use for inference (e.g., 'cpu', 'cuda', 'cuda:0')
//! * `<IMAGES>...` - Paths to input images to process
//!
//! # Example
//!
//! ```bash
//! cargo run --example text_recognition -- -w TPS-ResNet-BiLSTM-Attn.safetensors \
//!     --transformation TPS --feature-extraction ResNet --prediction Attn word1.png word2.png
//! ```

use clap::Parser;
use oar_str::core::constants::DEFAULT_CHARACTERS;
use oar_str::models::RecognitionModelConfig;
use oar_str::predictor::TextRecognizer;
use oar_str::processors::read_character_dict;
use oar_str::utils::{init_tracing, load_image, parse_device};
use std::path::Path;
use tracing::{error, info};

/// Command-line arguments for the text recognition example
#[derive(Parser)]
#[command(name = "text_recognition")]
#[command(about = "Text Recognition Example - recognizes text in word images")]
struct Args {
    /// Path to the safetensors checkpoint
    #[arg(short, long)]
    weights: String,

    /// Path to a JSON model configuration
    #[arg(short, long)]
    config: Option<String>,

    /// Path to the character dictionary file
    #[arg(short = 'd', long)]
    char_dict_path: Option<String>,

    /// Transformation stage ("TPS" or "None")
    #[arg(long)]
    transformation: Option<String>,

    /// Feature extraction backbone ("VGG", "RCNN" or "ResNet")
    #[arg(long)]
    feature_extraction: Option<String>,

    /// Sequence modeling stage ("BiLSTM" or "None")
    #[arg(long)]
    sequence_modeling: Option<String>,

    /// Prediction head ("CTC" or "Attn")
    #[arg(long)]
    prediction: Option<String>,

    /// Keep the aspect ratio of the crops and pad on the right
    #[arg(long)]
    keep_ratio: bool,

    /// Paths to input images to process
    #[arg(required = true)]
    images: Vec<String>,

    /// Device to use for inference (e.g., 'cpu', 'cuda', 'cuda:0')
    #[arg(long, default_value = "cpu")]
    device: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    info!("Text Recognition Example");

    let mut config = match &args.config {
        Some(path) => RecognitionModelConfig::from_path(path)?,
        None => RecognitionModelConfig::default(),
    };
    if let Some(selector) = args.transformation {
        config.transformation = selector;
    }
    if let Some(selector) = args.feature_extraction {
        config.feature_extraction = selector;
    }
    if let Some(selector) = args.sequence_modeling {
        config.sequence_modeling = selector;
    }
    if let Some(selector) = args.prediction {
        config.prediction = selector;
    }

    let characters = match &args.char_dict_path {
        Some(path) => read_character_dict(Path::new(path))?,
        None => DEFAULT_CHARACTERS.to_string(),
    };

    // The class count follows from the dictionary and the prediction head.
    config.num_class = match config.prediction.as_str() {
        "Attn" => characters.chars().count() + 2,
        _ => characters.chars().count() + 1,
    };

    let device = parse_device(&args.device)?;
    info!("Using device: {}", args.device);

    let recognizer = TextRecognizer::from_safetensors(&args.weights, config, &characters, device)?
        .with_keep_ratio(args.keep_ratio)?;

    let mut images = Vec::new();
    let mut image_paths = Vec::new();
    for image_path in &args.images {
        match load_image(Path::new(image_path)) {
            Ok(img) => {
                images.push(img);
                image_paths.push(image_path.clone());
            }
            Err(e) => {
                error!("Failed to load image {}: {}", image_path, e);
            }
        }
    }

    if images.is_empty() {
        error!("No images could be loaded for processing");
        return Err("No images could be loaded".into());
    }

    info!("Processing {} images...", images.len());
    match recognizer.recognize(&images) {
        Ok(results) => {
            for (i, (path, (text, score))) in image_paths.iter().zip(results.iter()).enumerate() {
                info!("{}. {}: '{}' (confidence: {:.3})", i + 1, path, text, score);
            }
        }
        Err(e) => {
            error!("Recognition failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
