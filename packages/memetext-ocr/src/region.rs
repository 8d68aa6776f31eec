/// Position of a detection, as ratios of the overall image size.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Line,
    Word,
}

#[derive(Debug, Clone)]
pub struct TextRegion {
    pub text: String,
    pub kind: Option<RegionKind>,
    pub bounding_box: Option<BoundingBox>,
    pub confidence: Option<f32>,
}

impl TextRegion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: None,
            bounding_box: None,
            confidence: None,
        }
    }
}
