use clap::Parser;
use memetext_ocr::RekognitionOcrEngine;
use memetext_rs::cli::Args;
use memetext_rs::pipeline::Pipeline;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
  let args = Args::parse();

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter())))
    .with(
      tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr),
    )
    .init();

  let engine = RekognitionOcrEngine::from_options(&args.aws_options()).await;
  let pipeline = Pipeline::new(args.pipeline_options(), engine);

  let summary = pipeline.run().await;
  if !summary.is_success() {
    for failure in &summary.failures {
      eprintln!("Error: {}: {:#}", failure.input.display(), failure.error);
    }
    std::process::exit(1);
  }
}
