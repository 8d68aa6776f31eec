//! Integration tests for the memetext-rs library API

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use memetext_rs::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns canned detections and counts how often it was asked.
struct CannedEngine {
    lines: Vec<&'static str>,
    calls: AtomicUsize,
}

impl CannedEngine {
    fn new(lines: Vec<&'static str>) -> Self {
        Self {
            lines,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl OcrEngine for CannedEngine {
    async fn recognize(&self, input: &OcrInput) -> Result<OcrOutput, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match input {
            OcrInput::Bytes(data) if data.starts_with(&[0xFF, 0xD8]) => Ok(OcrOutput::from_regions(
                self.lines.iter().copied().map(TextRegion::new).collect(),
            )),
            _ => Err(OcrError::InvalidInput("expected a jpeg payload".to_string())),
        }
    }
}

fn write_image(dir: &Path, name: &str, format: ImageFormat) -> PathBuf {
    let path = dir.join(name);
    let img = RgbImage::from_fn(32, 20, |x, y| Rgb([(x * 7) as u8, (y * 11) as u8, 90]));
    img.save_with_format(&path, format).unwrap();
    path
}

#[test]
fn test_prelude_imports() {
    let words = sanitize_words(["Hello, World!", "hello world"], &Punctuation::default());
    assert_eq!(words, vec!["hello", "world"]);
    assert_eq!(describe_words(&words), "hello world");
    assert_eq!(DESCRIPTION_FIELD, "ImageDescription");
    assert_eq!(output_path(Path::new("a/b.png"), ".exif"), PathBuf::from("a/b.exif.png"));
}

#[tokio::test]
async fn test_pipeline_writes_description_into_copy() {
    let dir = tempfile::tempdir().unwrap();
    let jpeg = write_image(dir.path(), "doge.jpg", ImageFormat::Jpeg);
    let png = write_image(dir.path(), "cat.png", ImageFormat::Png);
    let original_png = std::fs::read(&png).unwrap();

    let engine = CannedEngine::new(vec!["SUCH WOW", "much meme!", "such", "wow"]);
    let options = PipelineOptions {
        inputs: vec![jpeg.clone(), png.clone()],
        quiet: true,
        ..Default::default()
    };
    let pipeline = Pipeline::new(options, engine);
    let summary = pipeline.run().await;

    assert!(summary.is_success(), "failures: {:?}", summary.failures);
    assert_eq!(summary.processed.len(), 2);

    for report in &summary.processed {
        assert_eq!(report.words, vec!["meme", "much", "such", "wow"]);
        assert!(report.upload_bytes > 0);
        let bytes = std::fs::read(&report.output).unwrap();
        assert_eq!(
            read_description(&bytes).unwrap().as_deref(),
            Some("meme much such wow")
        );
    }

    assert_eq!(summary.processed[0].output, dir.path().join("doge.exif.jpg"));
    assert_eq!(summary.processed[1].output, dir.path().join("cat.exif.png"));
    assert_eq!(summary.processed[1].format, SourceFormat::Raster(ImageFormat::Png));

    // The original is left untouched.
    assert_eq!(std::fs::read(&png).unwrap(), original_png);
}

#[tokio::test]
async fn test_pipeline_continues_past_failures() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.png");
    let garbage = dir.path().join("garbage.png");
    std::fs::write(&garbage, b"not an image at all").unwrap();
    let good = write_image(dir.path(), "good.png", ImageFormat::Png);

    let options = PipelineOptions {
        inputs: vec![missing.clone(), garbage.clone(), good.clone()],
        quiet: true,
        ..Default::default()
    };
    let pipeline = Pipeline::new(options, CannedEngine::new(vec!["ok"]));
    let summary = pipeline.run().await;

    assert!(!summary.is_success());
    assert_eq!(summary.processed.len(), 1);
    assert_eq!(summary.processed[0].input, good);

    let failed: Vec<_> = summary.failures.iter().map(|f| f.input.clone()).collect();
    assert_eq!(failed, vec![missing, garbage]);
    assert!(format!("{:#}", summary.failures[0].error).contains("failed to open file"));
    assert!(format!("{:#}", summary.failures[1].error).contains("failed to convert image data as jpeg"));
    assert!(summary.failures.iter().all(|f| f.words.is_none()));
    assert!(!dir.path().join("garbage.exif.png").exists());
}

#[tokio::test]
async fn test_fail_fast_stops_at_first_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.jpg");
    let good = write_image(dir.path(), "good.jpg", ImageFormat::Jpeg);

    let options = PipelineOptions {
        inputs: vec![missing, good],
        quiet: true,
        fail_fast: true,
        ..Default::default()
    };
    let pipeline = Pipeline::new(options, CannedEngine::new(vec!["never"]));
    let summary = pipeline.run().await;

    assert_eq!(summary.failures.len(), 1);
    assert!(summary.processed.is_empty());
    assert!(!dir.path().join("good.exif.jpg").exists());
}

#[tokio::test]
async fn test_detection_errors_leave_no_copy() {
    struct FailingEngine;

    #[async_trait]
    impl OcrEngine for FailingEngine {
        async fn recognize(&self, _input: &OcrInput) -> Result<OcrOutput, OcrError> {
            Err(OcrError::Service("ThrottlingException: slow down".to_string()))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let input = write_image(dir.path(), "meme.png", ImageFormat::Png);
    let pipeline = Pipeline::new(PipelineOptions::default(), FailingEngine);

    let err = pipeline.process_file(&input).await.unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("failed to detect the text in the image"), "{}", message);
    assert!(message.contains("ThrottlingException"), "{}", message);
    assert!(!dir.path().join("meme.exif.png").exists());
}

#[tokio::test]
async fn test_blank_detection_writes_empty_description() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_image(dir.path(), "blank.jpg", ImageFormat::Jpeg);
    let engine = CannedEngine::new(vec!["", "   "]);
    let pipeline = Pipeline::new(PipelineOptions::default(), engine);

    let report = pipeline.process_file(&input).await.unwrap();
    assert_eq!(report.words, vec![""]);

    let bytes = std::fs::read(&report.output).unwrap();
    assert_eq!(read_description(&bytes).unwrap().as_deref(), Some(""));
}

#[tokio::test]
async fn test_run_prints_word_lines() {
    let dir = tempfile::tempdir().unwrap();
    let doge = write_image(dir.path(), "doge.png", ImageFormat::Png);

    let options = PipelineOptions {
        inputs: vec![doge.clone()],
        ..Default::default()
    };
    let pipeline = Pipeline::new(options, CannedEngine::new(vec!["Such WOW!", "such"]));
    let mut out = Vec::new();
    let summary = pipeline.run_with_output(&mut out).await;

    assert!(summary.is_success());
    assert_eq!(String::from_utf8(out).unwrap(), format!("{}: such wow\n", doge.display()));
}

#[tokio::test]
async fn test_quiet_run_prints_bare_words() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_image(dir.path(), "first.jpg", ImageFormat::Jpeg);
    let blank = write_image(dir.path(), "blank.png", ImageFormat::Png);

    let options = PipelineOptions {
        inputs: vec![first],
        quiet: true,
        ..Default::default()
    };
    let mut out = Vec::new();
    Pipeline::new(options, CannedEngine::new(vec!["ONE does not"]))
        .run_with_output(&mut out)
        .await;

    let options = PipelineOptions {
        inputs: vec![blank],
        quiet: true,
        ..Default::default()
    };
    Pipeline::new(options, CannedEngine::new(vec!["", "   "]))
        .run_with_output(&mut out)
        .await;

    assert_eq!(String::from_utf8(out).unwrap(), "does not one\n\n");
}

#[tokio::test]
async fn test_words_are_printed_before_the_copy_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let gif = write_image(dir.path(), "dance.gif", ImageFormat::Gif);
    let bmp = write_image(dir.path(), "old.bmp", ImageFormat::Bmp);

    let options = PipelineOptions {
        inputs: vec![gif.clone(), bmp.clone()],
        quiet: true,
        ..Default::default()
    };
    let pipeline = Pipeline::new(options, CannedEngine::new(vec!["SUCH WOW"]));
    let mut out = Vec::new();
    let summary = pipeline.run_with_output(&mut out).await;

    assert_eq!(String::from_utf8(out).unwrap(), "such wow\nsuch wow\n");
    assert!(summary.processed.is_empty());
    assert_eq!(summary.failures.len(), 2);
    for failure in &summary.failures {
        assert_eq!(failure.words.as_deref(), Some(&["such".to_string(), "wow".to_string()][..]));
        let message = format!("{:#}", failure.error);
        assert!(message.contains("failed to write image description"), "{}", message);
        assert!(message.contains("unsupported container"), "{}", message);
    }
    assert!(!dir.path().join("dance.exif.gif").exists());
    assert!(!dir.path().join("old.exif.bmp").exists());
}

#[tokio::test]
async fn test_pipeline_handles_webp_and_tiff() {
    let dir = tempfile::tempdir().unwrap();
    let webp = write_image(dir.path(), "cat.webp", ImageFormat::WebP);
    let tiff = write_image(dir.path(), "scan.tiff", ImageFormat::Tiff);

    let options = PipelineOptions {
        inputs: vec![webp, tiff],
        quiet: true,
        ..Default::default()
    };
    let pipeline = Pipeline::new(options, CannedEngine::new(vec!["I CAN HAZ"]));
    let summary = pipeline.run_with_output(&mut Vec::new()).await;

    assert!(summary.is_success(), "failures: {:?}", summary.failures);
    assert_eq!(summary.processed[0].output, dir.path().join("cat.exif.webp"));
    assert_eq!(summary.processed[1].output, dir.path().join("scan.exif.tiff"));
    for report in &summary.processed {
        let bytes = std::fs::read(&report.output).unwrap();
        assert_eq!(read_description(&bytes).unwrap().as_deref(), Some("can haz i"));
        assert!(image::load_from_memory(&bytes).is_ok());
    }
}
