//! Drives each input through decode, text detection, normalization, and the metadata write.
use crate::exif_writer::{writable_container, write_description};
use crate::image_codec::{prepare_upload, SourceFormat, DEFAULT_JPEG_QUALITY};
use crate::text_normalizer::{describe_words, sanitize_words, Punctuation};
use anyhow::{anyhow, Context, Result};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use memetext_ocr::{OcrEngine, OcrInput, MAX_PAYLOAD_BYTES};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Inserted between the file stem and extension of the copy.
pub const DEFAULT_SUFFIX: &str = ".exif";

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
  pub inputs: Vec<PathBuf>,
  pub jpeg_quality: u8,
  pub suffix: String,
  /// Stop at the first file that fails instead of moving on.
  pub fail_fast: bool,
  pub quiet: bool,
  pub punctuation: Punctuation,
}

impl Default for PipelineOptions {
  fn default() -> Self {
    Self {
      inputs: Vec::new(),
      jpeg_quality: DEFAULT_JPEG_QUALITY,
      suffix: DEFAULT_SUFFIX.to_string(),
      fail_fast: false,
      quiet: false,
      punctuation: Punctuation::default(),
    }
  }
}

/// Text detected in one file, before anything is written to disk.
#[derive(Debug, Clone)]
pub struct Detection {
  pub input: PathBuf,
  pub source: Vec<u8>,
  pub format: SourceFormat,
  pub upload_bytes: usize,
  pub words: Vec<String>,
}

/// Outcome of one successfully processed file.
#[derive(Debug, Clone)]
pub struct FileReport {
  pub input: PathBuf,
  pub output: PathBuf,
  pub format: SourceFormat,
  pub upload_bytes: usize,
  pub words: Vec<String>,
}

/// A file that could not be processed. `words` is set when detection
/// succeeded and a later step failed.
#[derive(Debug)]
pub struct FileFailure {
  pub input: PathBuf,
  pub words: Option<Vec<String>>,
  pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct RunSummary {
  pub processed: Vec<FileReport>,
  pub failures: Vec<FileFailure>,
}

impl RunSummary {
  pub fn is_success(&self) -> bool {
    self.failures.is_empty()
  }
}

/// The stdout line for one file: `path: word word ...`, or only the words when quiet.
pub fn word_line(input: &Path, words: &[String], quiet: bool) -> String {
  let words = describe_words(words);
  if quiet {
    words
  } else {
    format!("{}: {}", input.display(), words)
  }
}

/// `dir/name.ext` becomes `dir/name{suffix}.ext`.
pub fn output_path(input: &Path, suffix: &str) -> PathBuf {
  let stem = input
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();
  let name = match input.extension() {
    Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
    None => format!("{}{}", stem, suffix),
  };
  input.with_file_name(name)
}

/// Copies a regular file, returning the number of bytes written.
pub async fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
  let metadata = fs::metadata(src)
    .await
    .with_context(|| format!("could not stat {}", src.display()))?;
  if !metadata.is_file() {
    return Err(anyhow!("{} is not a regular file", src.display()));
  }

  fs::copy(src, dst)
    .await
    .with_context(|| format!("could not copy from {} to {}", src.display(), dst.display()))
}

pub struct Pipeline<E> {
  options: PipelineOptions,
  engine: E,
}

impl<E: OcrEngine> Pipeline<E> {
  pub fn new(options: PipelineOptions, engine: E) -> Self {
    Self { options, engine }
  }

  pub fn options(&self) -> &PipelineOptions {
    &self.options
  }

  /// Reads, decodes, uploads, and normalizes one file.
  pub async fn detect(&self, input: &Path) -> Result<Detection> {
    let source = fs::read(input).await.context("failed to open file")?;

    let prepared =
      prepare_upload(&source, self.options.jpeg_quality).context("failed to convert image data as jpeg")?;
    let upload_bytes = prepared.jpeg.len();
    debug!(
      file = %input.display(),
      format = prepared.format.name(),
      width = prepared.width,
      height = prepared.height,
      size = %HumanBytes(upload_bytes as u64),
      limit = %HumanBytes(MAX_PAYLOAD_BYTES as u64),
      "prepared upload"
    );

    let detected = self
      .engine
      .recognize(&OcrInput::Bytes(prepared.jpeg))
      .await
      .context("failed to detect the text in the image")?;
    let words = sanitize_words(detected.lines(), &self.options.punctuation);
    debug!(file = %input.display(), detections = detected.regions.len(), words = words.len(), "sanitized text");

    Ok(Detection {
      input: input.to_path_buf(),
      source,
      format: prepared.format,
      upload_bytes,
      words,
    })
  }

  /// Copies the input next to itself and stores the words in the copy.
  /// Files whose container cannot hold EXIF are refused before anything is copied.
  pub async fn persist(&self, detection: Detection) -> Result<FileReport> {
    writable_container(&detection.source).context("failed to write image description")?;

    let output = output_path(&detection.input, &self.options.suffix);
    copy_file(&detection.input, &output)
      .await
      .context("failed to copy output file")?;

    write_description(&output, &describe_words(&detection.words))
      .await
      .context("failed to write image description")?;
    info!(file = %output.display(), "wrote image description");

    Ok(FileReport {
      input: detection.input,
      output,
      format: detection.format,
      upload_bytes: detection.upload_bytes,
      words: detection.words,
    })
  }

  /// Runs every step for one file without printing.
  pub async fn process_file(&self, input: &Path) -> Result<FileReport> {
    let detection = self.detect(input).await?;
    self.persist(detection).await
  }

  /// Processes every input in order, printing each word list to stdout.
  pub async fn run(&self) -> RunSummary {
    self.run_with_output(&mut io::stdout()).await
  }

  /// Processes every input in order. Word lines go to `out` as soon as the
  /// text is detected, before the copy is written.
  pub async fn run_with_output<W: Write>(&self, out: &mut W) -> RunSummary {
    let mut summary = RunSummary::default();

    for input in &self.options.inputs {
      let spinner = self.spinner(input);
      let detection = self.detect(input).await;
      if let Some(spinner) = spinner {
        spinner.finish_and_clear();
      }

      let result = match detection {
        Ok(detection) => {
          let line = word_line(input, &detection.words, self.options.quiet);
          if let Err(e) = writeln!(out, "{}", line) {
            debug!(error = %e, "failed to print word list");
          }
          let words = detection.words.clone();
          self.persist(detection).await.map_err(|error| FileFailure {
            input: input.clone(),
            words: Some(words),
            error,
          })
        }
        Err(error) => Err(FileFailure {
          input: input.clone(),
          words: None,
          error,
        }),
      };

      match result {
        Ok(report) => summary.processed.push(report),
        Err(failure) => {
          debug!(file = %input.display(), "{:#}", failure.error);
          summary.failures.push(failure);
          if self.options.fail_fast {
            break;
          }
        }
      }
    }

    summary
  }

  fn spinner(&self, input: &Path) -> Option<ProgressBar> {
    if self.options.quiet {
      return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{msg} {spinner:.green}") {
      pb.set_style(style);
    }
    pb.set_message(input.display().to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
  }
}
