use async_trait::async_trait;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{Image, TextDetection, TextTypes};
use aws_sdk_rekognition::Client;
use tracing::debug;

use crate::engine::{check_payload, OcrEngine, OcrError, OcrInput, OcrOutput};
use crate::region::{BoundingBox, RegionKind, TextRegion};

use super::config::AwsOptions;

pub struct RekognitionOcrEngine {
    client: Client,
}

impl RekognitionOcrEngine {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_options(options: &AwsOptions) -> Self {
        let config = options.load().await;
        debug!(
            region = ?config.region(),
            max_attempts = options.max_attempts(),
            "loaded AWS configuration"
        );
        Self::new(Client::new(&config))
    }
}

fn to_region(detection: &TextDetection) -> Option<TextRegion> {
    let text = detection.detected_text()?;
    let kind = match detection.r#type() {
        Some(TextTypes::Line) => Some(RegionKind::Line),
        Some(TextTypes::Word) => Some(RegionKind::Word),
        _ => None,
    };
    let bounding_box = detection
        .geometry()
        .and_then(|g| g.bounding_box())
        .map(|b| BoundingBox {
            left: b.left().unwrap_or_default(),
            top: b.top().unwrap_or_default(),
            width: b.width().unwrap_or_default(),
            height: b.height().unwrap_or_default(),
        });

    Some(TextRegion {
        text: text.to_string(),
        kind,
        bounding_box,
        confidence: detection.confidence(),
    })
}

#[async_trait]
impl OcrEngine for RekognitionOcrEngine {
    async fn recognize(&self, input: &OcrInput) -> Result<OcrOutput, OcrError> {
        let data = input.clone().into_bytes().await?;
        check_payload(&data)?;

        let image = Image::builder().bytes(Blob::new(data)).build();
        let response = self
            .client
            .detect_text()
            .image(image)
            .send()
            .await
            .map_err(|e| OcrError::Service(DisplayErrorContext(&e).to_string()))?;

        let regions: Vec<TextRegion> = response.text_detections().iter().filter_map(to_region).collect();
        debug!(detections = regions.len(), "text detection finished");

        Ok(OcrOutput::from_regions(regions))
    }
}
