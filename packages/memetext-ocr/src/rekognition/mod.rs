//! Text detection through AWS Rekognition's `DetectText` API.
mod config;
mod engine;

pub use config::{AwsOptions, DEFAULT_RETRIES};
pub use engine::RekognitionOcrEngine;
