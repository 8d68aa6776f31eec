pub mod engine;
pub mod region;
pub mod rekognition;

pub use engine::{OcrEngine, OcrError, OcrInput, OcrOutput, MAX_PAYLOAD_BYTES};
pub use region::{BoundingBox, RegionKind, TextRegion};
pub use rekognition::{AwsOptions, RekognitionOcrEngine};
