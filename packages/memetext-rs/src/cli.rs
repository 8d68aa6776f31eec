//! Command line arguments backing the `memetext` binary.
use crate::image_codec::DEFAULT_JPEG_QUALITY;
use crate::pipeline::PipelineOptions;
use clap::Parser;
use memetext_ocr::rekognition::DEFAULT_RETRIES;
use memetext_ocr::AwsOptions;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
  name = "memetext",
  about = "Reads the text in meme images and writes it into their EXIF description so they become searchable",
  version
)]
pub struct Args {
  /// Image files to process
  #[arg(required = true, value_name = "FILES")]
  pub files: Vec<PathBuf>,

  /// The AWS CLI profile with which to perform the request
  #[arg(long, short = 'p')]
  pub profile: Option<String>,

  /// The AWS region in which to perform the request
  #[arg(long, short = 'r')]
  pub region: Option<String>,

  /// The max number of times to retry failed AWS requests
  #[arg(long, short = 't', default_value_t = DEFAULT_RETRIES)]
  pub retries: u32,

  /// Enable verbose logging. Opposite of quiet mode
  #[arg(long, short = 'v', conflicts_with = "quiet")]
  pub verbose: bool,

  /// Enable silent mode. Opposite of verbose mode
  #[arg(long, short = 'q')]
  pub quiet: bool,

  /// JPEG quality of the image uploaded for text detection
  #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
  pub quality: u8,

  /// Stop at the first file that fails
  #[arg(long)]
  pub fail_fast: bool,
}

impl Args {
  pub fn aws_options(&self) -> AwsOptions {
    AwsOptions {
      profile: self.profile.clone(),
      region: self.region.clone(),
      retries: self.retries,
    }
  }

  pub fn pipeline_options(&self) -> PipelineOptions {
    PipelineOptions {
      inputs: self.files.clone(),
      jpeg_quality: self.quality,
      fail_fast: self.fail_fast,
      quiet: self.quiet,
      ..Default::default()
    }
  }

  /// Default log filter when `RUST_LOG` is unset.
  pub fn log_filter(&self) -> &'static str {
    if self.verbose {
      "memetext=debug,memetext_rs=debug,memetext_ocr=debug"
    } else if self.quiet {
      "error"
    } else {
      "warn"
    }
  }
}
