use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::region::TextRegion;

/// Largest image payload the detection service accepts inline (5 MB).
pub const MAX_PAYLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum OcrInput {
    FilePath(PathBuf),
    Bytes(Vec<u8>),
}

impl OcrInput {
    /// Resolves the input to the raw bytes that get uploaded.
    pub async fn into_bytes(self) -> Result<Vec<u8>, OcrError> {
        match self {
            OcrInput::FilePath(path) => tokio::fs::read(&path)
                .await
                .map_err(|e| OcrError::InvalidInput(format!("{}: {}", path.display(), e))),
            OcrInput::Bytes(data) => Ok(data),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OcrOutput {
    pub text: String,
    pub regions: Vec<TextRegion>,
}

impl OcrOutput {
    pub fn from_regions(regions: Vec<TextRegion>) -> Self {
        let text = regions
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self { text, regions }
    }

    /// Every detected string, in the order the engine reported them.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.text.as_str())
    }
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("image payload is {size} bytes, the service limit is {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("service error: {0}")]
    Service(String),
}

/// Rejects payloads the service would refuse anyway.
pub fn check_payload(data: &[u8]) -> Result<(), OcrError> {
    if data.is_empty() {
        return Err(OcrError::InvalidInput("empty image payload".to_string()));
    }
    if data.len() > MAX_PAYLOAD_BYTES {
        return Err(OcrError::PayloadTooLarge {
            size: data.len(),
            limit: MAX_PAYLOAD_BYTES,
        });
    }
    Ok(())
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, input: &OcrInput) -> Result<OcrOutput, OcrError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoEngine;

    #[async_trait]
    impl OcrEngine for EchoEngine {
        async fn recognize(&self, input: &OcrInput) -> Result<OcrOutput, OcrError> {
            let data = input.clone().into_bytes().await?;
            check_payload(&data)?;
            let text = String::from_utf8_lossy(&data).to_string();
            Ok(OcrOutput::from_regions(
                text.lines().map(TextRegion::new).collect(),
            ))
        }
    }

    #[test]
    fn test_payload_limit() {
        assert!(check_payload(&[0u8; 16]).is_ok());
        assert!(check_payload(&vec![0u8; MAX_PAYLOAD_BYTES]).is_ok());
        match check_payload(&vec![0u8; MAX_PAYLOAD_BYTES + 1]) {
            Err(OcrError::PayloadTooLarge { size, limit }) => {
                assert_eq!(size, MAX_PAYLOAD_BYTES + 1);
                assert_eq!(limit, MAX_PAYLOAD_BYTES);
            }
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
        assert!(matches!(check_payload(&[]), Err(OcrError::InvalidInput(_))));
    }

    #[test]
    fn test_output_joins_regions() {
        let output = OcrOutput::from_regions(vec![TextRegion::new("ONE"), TextRegion::new("two")]);
        assert_eq!(output.text, "ONE\ntwo");
        assert_eq!(output.lines().collect::<Vec<_>>(), vec!["ONE", "two"]);
    }

    #[tokio::test]
    async fn test_engine_trait_object() {
        let engine: Box<dyn OcrEngine> = Box::new(EchoEngine);
        let output = engine
            .recognize(&OcrInput::Bytes(b"hello\nworld".to_vec()))
            .await
            .unwrap();
        assert_eq!(output.regions.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_invalid_input() {
        let input = OcrInput::FilePath(PathBuf::from("/definitely/not/here.png"));
        let err = input.into_bytes().await.unwrap_err();
        assert!(matches!(err, OcrError::InvalidInput(_)));
    }
}
