//! # memetext-rs
//!
//! Makes meme images searchable: the text in each image is detected with AWS
//! Rekognition, normalized into a sorted list of lowercase words, and written
//! into the EXIF `ImageDescription` of a copy saved next to the original.
//!
//! ## Quick Start
//!
//! ```ignore
//! use memetext_rs::prelude::*;
//!
//! let words = sanitize_words(["Hello, World!", "hello world"], &Punctuation::default());
//! assert_eq!(words, vec!["hello", "world"]);
//!
//! let engine = RekognitionOcrEngine::from_options(&AwsOptions::default()).await;
//! let options = PipelineOptions { inputs: vec!["doge.jpg".into()], ..Default::default() };
//! let summary = Pipeline::new(options, engine).run().await;
//! assert!(summary.is_success());
//! ```

pub mod cli;
pub mod exif_writer;
pub mod image_codec;
pub mod pipeline;
pub mod text_normalizer;

// Re-export commonly used types at the root level
pub use exif_writer::{
  embed, read_description, read_metadata, rewrite_field, serialize, set_text_field, writable_container,
  write_description, Container, MetadataBlock, MetadataError, DESCRIPTION_FIELD,
};
pub use image_codec::{
  decode, encode_jpeg, prepare_upload, CodecError, PreparedImage, SourceFormat, DEFAULT_JPEG_QUALITY,
};
pub use pipeline::{output_path, word_line, Detection, FileFailure, FileReport, Pipeline, PipelineOptions, RunSummary};
pub use text_normalizer::{describe_words, sanitize_words, Punctuation};

/// Prelude module for convenient imports
///
/// ```ignore
/// use memetext_rs::prelude::*;
/// ```
pub mod prelude {
  pub use crate::{
    describe_words, output_path, read_description, sanitize_words, word_line, write_description, FileFailure,
    FileReport, Pipeline, PipelineOptions, Punctuation, RunSummary, SourceFormat, DESCRIPTION_FIELD,
  };
  pub use memetext_ocr::{AwsOptions, OcrEngine, OcrError, OcrInput, OcrOutput, RekognitionOcrEngine, TextRegion};
}
