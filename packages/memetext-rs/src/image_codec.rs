//! Decodes input images of any supported format and re-encodes them as JPEG for upload.
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

/// JPEG quality used for the upload when none is configured.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// `ftyp` brands written by HEIC encoders (iPhone photos and screenshots among them).
const HEIC_BRANDS: &[&[u8; 4]] = &[b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis"];

/// Generic HEIF brands; these need a HEIC compatible brand to qualify.
const HEIF_BRANDS: &[&[u8; 4]] = &[b"mif1", b"msf1"];

#[derive(Debug, Error)]
pub enum CodecError {
  #[error("unrecognized image format")]
  UnknownFormat(#[source] image::ImageError),
  #[error("decoding error")]
  Decode(#[source] image::ImageError),
  #[cfg(feature = "heic")]
  #[error("HEIC decoding error")]
  HeicDecode(#[source] libheif_rs::HeifError),
  #[error("HEIC decoding error: {0}")]
  HeicMalformed(String),
  #[error("HEIC input needs the `heic` feature")]
  HeicUnsupported,
  #[error("jpeg encoding error")]
  Encode(#[source] image::ImageError),
  #[error("jpeg quality must be between 1 and 100, got {0}")]
  InvalidQuality(u8),
}

/// Format an input was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
  Raster(ImageFormat),
  Heic,
}

impl SourceFormat {
  /// Short lowercase name, e.g. `png`.
  pub fn name(self) -> &'static str {
    match self {
      SourceFormat::Raster(format) => format_name(format),
      SourceFormat::Heic => "heic",
    }
  }
}

/// A decoded input, re-encoded and ready to hand to the text detector.
#[derive(Debug, Clone)]
pub struct PreparedImage {
  pub format: SourceFormat,
  pub width: u32,
  pub height: u32,
  pub jpeg: Vec<u8>,
}

/// True when `bytes` start with an ISO-BMFF `ftyp` box naming a HEIC brand.
pub fn is_heic(bytes: &[u8]) -> bool {
  if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
    return false;
  }
  let major = &bytes[8..12];
  if HEIC_BRANDS.iter().any(|b| &b[..] == major) {
    return true;
  }
  if !HEIF_BRANDS.iter().any(|b| &b[..] == major) {
    return false;
  }

  // Compatible brands follow the major brand and minor version.
  let box_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
  let end = box_len.min(bytes.len());
  bytes
    .get(16..end)
    .map(|brands| brands.chunks_exact(4).any(|b| HEIC_BRANDS.iter().any(|h| &h[..] == b)))
    .unwrap_or(false)
}

#[cfg(feature = "heic")]
fn decode_heic(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
  use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

  let lib_heif = LibHeif::new();
  let ctx = HeifContext::read_from_bytes(bytes).map_err(CodecError::HeicDecode)?;
  let handle = ctx.primary_image_handle().map_err(CodecError::HeicDecode)?;
  let decoded = lib_heif
    .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
    .map_err(CodecError::HeicDecode)?;

  let planes = decoded.planes();
  let plane = planes
    .interleaved
    .ok_or_else(|| CodecError::HeicMalformed("no interleaved RGB plane".to_string()))?;

  let row_len = plane.width as usize * 3;
  let mut pixels = Vec::with_capacity(row_len * plane.height as usize);
  for row in plane.data.chunks(plane.stride).take(plane.height as usize) {
    let row = row
      .get(..row_len)
      .ok_or_else(|| CodecError::HeicMalformed("short pixel row".to_string()))?;
    pixels.extend_from_slice(row);
  }

  image::RgbImage::from_raw(plane.width, plane.height, pixels)
    .map(DynamicImage::ImageRgb8)
    .ok_or_else(|| CodecError::HeicMalformed("pixel buffer does not match dimensions".to_string()))
}

#[cfg(not(feature = "heic"))]
fn decode_heic(_bytes: &[u8]) -> Result<DynamicImage, CodecError> {
  Err(CodecError::HeicUnsupported)
}

/// Decodes `bytes`, sniffing the format from its magic number.
pub fn decode(bytes: &[u8]) -> Result<(DynamicImage, SourceFormat), CodecError> {
  if is_heic(bytes) {
    return Ok((decode_heic(bytes)?, SourceFormat::Heic));
  }

  let format = image::guess_format(bytes).map_err(CodecError::UnknownFormat)?;
  let img = image::load_from_memory_with_format(bytes, format).map_err(CodecError::Decode)?;
  Ok((img, SourceFormat::Raster(format)))
}

/// Encodes the image as a baseline JPEG. Alpha is dropped and 16-bit channels are narrowed.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, CodecError> {
  if !(1..=100).contains(&quality) {
    return Err(CodecError::InvalidQuality(quality));
  }

  let rgb = img.to_rgb8();
  let mut buf = Vec::new();
  let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
  encoder.encode_image(&rgb).map_err(CodecError::Encode)?;

  Ok(buf)
}

pub fn prepare_upload(bytes: &[u8], quality: u8) -> Result<PreparedImage, CodecError> {
  let (img, format) = decode(bytes)?;
  let jpeg = encode_jpeg(&img, quality)?;

  Ok(PreparedImage {
    format,
    width: img.width(),
    height: img.height(),
    jpeg,
  })
}

/// Short lowercase name for a format, e.g. `png`.
pub fn format_name(format: ImageFormat) -> &'static str {
  format.extensions_str().first().copied().unwrap_or("unknown")
}
