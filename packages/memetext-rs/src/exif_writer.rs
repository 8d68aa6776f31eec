//! Reads, edits, and re-embeds the EXIF block of an image file.
//!
//! Decoding and TIFF encoding go through `kamadak-exif`. Splicing the encoded
//! block back into the container is done here for JPEG (APP1 segment), PNG
//! (`eXIf` chunk) and WebP (RIFF `EXIF` chunk). TIFF files already are an
//! IFD structure, so their first IFD is rewritten directly.
use exif::experimental::Writer;
use exif::{Field, In, Reader, Tag, Value};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Field that receives the searchable word list.
pub const DESCRIPTION_FIELD: &str = "ImageDescription";

/// ASCII fields of IFD0 that can be set by name.
const TEXT_FIELDS: &[(&str, Tag)] = &[
  ("ImageDescription", Tag::ImageDescription),
  ("Make", Tag::Make),
  ("Model", Tag::Model),
  ("Software", Tag::Software),
  ("DateTime", Tag::DateTime),
  ("Artist", Tag::Artist),
  ("Copyright", Tag::Copyright),
];

/// Regenerated by the encoder, never copied from the source.
const POINTER_TAGS: &[Tag] = &[Tag::ExifIFDPointer, Tag::GPSInfoIFDPointer, Tag::InteropIFDPointer];

/// Offsets into the old block; meaningless once re-encoded.
const IMAGE_DATA_TAGS: &[Tag] = &[
  Tag::JPEGInterchangeFormat,
  Tag::JPEGInterchangeFormatLength,
  Tag::StripOffsets,
  Tag::StripByteCounts,
  Tag::TileOffsets,
  Tag::TileByteCounts,
];

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const VP8X_ALPHA: u8 = 0x10;
const VP8X_EXIF: u8 = 0x08;

/// TIFF field type for NUL-terminated ASCII.
const TIFF_ASCII: u16 = 2;

#[derive(Debug, Error)]
pub enum MetadataError {
  #[error("failed to extract EXIF data")]
  Extract(#[source] exif::Error),
  #[error("failed to encode EXIF data")]
  Encode(#[source] exif::Error),
  #[error("unknown text field {0:?}")]
  UnknownField(String),
  #[error("unsupported container, EXIF can only be written into JPEG, PNG, WebP or TIFF files")]
  UnsupportedContainer,
  #[error("malformed {0} data: {1}")]
  Malformed(&'static str, String),
  #[error("EXIF block of {0} bytes does not fit in the container")]
  TooLarge(usize),
  #[error("{field} reads back as {found:?} after writing")]
  VerificationFailed { field: String, found: Option<String> },
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Image containers that EXIF can be spliced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
  Jpeg,
  Png,
  WebP,
  Tiff,
}

impl Container {
  pub fn detect(bytes: &[u8]) -> Option<Self> {
    if bytes.starts_with(&[0xFF, 0xD8]) {
      Some(Container::Jpeg)
    } else if bytes.starts_with(&PNG_SIGNATURE) {
      Some(Container::Png)
    } else if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
      Some(Container::WebP)
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
      Some(Container::Tiff)
    } else {
      None
    }
  }
}

/// The container of `bytes`, or an error when EXIF cannot be stored in it (GIF, BMP, HEIC, ...).
pub fn writable_container(bytes: &[u8]) -> Result<Container, MetadataError> {
  Container::detect(bytes).ok_or(MetadataError::UnsupportedContainer)
}

/// The editable contents of an EXIF block.
#[derive(Debug, Clone, Default)]
pub struct MetadataBlock {
  fields: Vec<Field>,
  little_endian: bool,
  thumbnail: Option<Vec<u8>>,
}

impl MetadataBlock {
  pub fn empty() -> Self {
    Self::default()
  }

  fn from_exif(exif: &exif::Exif) -> Self {
    let thumbnail = embedded_thumbnail(exif);
    let fields = exif
      .fields()
      .filter(|f| f.ifd_num == In::PRIMARY || (f.ifd_num == In::THUMBNAIL && thumbnail.is_some()))
      .filter(|f| !POINTER_TAGS.contains(&f.tag) && !IMAGE_DATA_TAGS.contains(&f.tag))
      .filter(|f| !matches!(f.value, Value::Unknown(..)))
      .cloned()
      .collect();

    Self {
      fields,
      little_endian: exif.little_endian(),
      thumbnail,
    }
  }

  pub fn fields(&self) -> &[Field] {
    &self.fields
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  pub fn thumbnail(&self) -> Option<&[u8]> {
    self.thumbnail.as_deref()
  }

  /// Value of a named IFD0 text field, if present.
  pub fn text_field(&self, name: &str) -> Option<String> {
    let tag = text_tag(name).ok()?;
    self
      .fields
      .iter()
      .find(|f| f.tag == tag && f.ifd_num == In::PRIMARY)
      .and_then(|f| match &f.value {
        Value::Ascii(parts) => Some(
          parts
            .first()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default(),
        ),
        _ => None,
      })
  }
}

fn text_tag(name: &str) -> Result<Tag, MetadataError> {
  TEXT_FIELDS
    .iter()
    .find(|(n, _)| *n == name)
    .map(|(_, tag)| *tag)
    .ok_or_else(|| MetadataError::UnknownField(name.to_string()))
}

fn embedded_thumbnail(exif: &exif::Exif) -> Option<Vec<u8>> {
  let offset = exif
    .get_field(Tag::JPEGInterchangeFormat, In::THUMBNAIL)?
    .value
    .get_uint(0)? as usize;
  let length = exif
    .get_field(Tag::JPEGInterchangeFormatLength, In::THUMBNAIL)?
    .value
    .get_uint(0)? as usize;
  exif.buf().get(offset..offset.checked_add(length)?).map(<[u8]>::to_vec)
}

/// Parses the EXIF block of any container `kamadak-exif` understands.
/// Files without EXIF yield an empty block.
pub fn read_metadata(bytes: &[u8]) -> Result<MetadataBlock, MetadataError> {
  match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
    Ok(exif) => Ok(MetadataBlock::from_exif(&exif)),
    Err(exif::Error::NotFound(_)) => Ok(MetadataBlock::empty()),
    Err(e) => Err(MetadataError::Extract(e)),
  }
}

/// Sets (or replaces) an ASCII field in IFD0.
pub fn set_text_field(mut block: MetadataBlock, name: &str, value: &str) -> Result<MetadataBlock, MetadataError> {
  let tag = text_tag(name)?;
  block.fields.retain(|f| !(f.tag == tag && f.ifd_num == In::PRIMARY));
  block.fields.push(Field {
    tag,
    ifd_num: In::PRIMARY,
    value: Value::Ascii(vec![value.as_bytes().to_vec()]),
  });
  Ok(block)
}

/// Encodes the block as a TIFF-structured EXIF stream.
pub fn serialize(block: &MetadataBlock) -> Result<Vec<u8>, MetadataError> {
  let mut writer = Writer::new();
  for field in &block.fields {
    writer.push_field(field);
  }
  if let Some(thumbnail) = &block.thumbnail {
    writer.set_jpeg(thumbnail, In::THUMBNAIL);
  }

  let mut buf = Cursor::new(Vec::new());
  writer.write(&mut buf, block.little_endian).map_err(MetadataError::Encode)?;
  Ok(buf.into_inner())
}

/// Returns a copy of `container` carrying `exif`, replacing any EXIF it had.
///
/// TIFF files are not wrappers around an EXIF stream; use [`rewrite_field`] for them.
pub fn embed(container: &[u8], exif: &[u8]) -> Result<Vec<u8>, MetadataError> {
  match Container::detect(container) {
    Some(Container::Jpeg) => embed_jpeg(container, exif),
    Some(Container::Png) => embed_png(container, exif),
    Some(Container::WebP) => embed_webp(container, exif),
    Some(Container::Tiff) | None => Err(MetadataError::UnsupportedContainer),
  }
}

fn embed_jpeg(data: &[u8], exif: &[u8]) -> Result<Vec<u8>, MetadataError> {
  let malformed = |msg: String| MetadataError::Malformed("JPEG", msg);

  // Length field counts itself.
  let segment_len = 2 + EXIF_HEADER.len() + exif.len();
  let segment_len = u16::try_from(segment_len).map_err(|_| MetadataError::TooLarge(exif.len()))?;

  let mut out = Vec::with_capacity(data.len() + segment_len as usize + 2);
  out.extend_from_slice(&data[..2]);

  let mut app1 = Vec::with_capacity(segment_len as usize + 2);
  app1.extend_from_slice(&[0xFF, 0xE1]);
  app1.extend_from_slice(&segment_len.to_be_bytes());
  app1.extend_from_slice(EXIF_HEADER);
  app1.extend_from_slice(exif);

  let mut inserted = false;
  let mut pos = 2;
  loop {
    if pos + 2 > data.len() {
      return Err(malformed("unexpected end of data".to_string()));
    }
    if data[pos] != 0xFF {
      return Err(malformed(format!("expected a marker at offset {}", pos)));
    }

    let marker = data[pos + 1];
    match marker {
      // Fill byte before a marker.
      0xFF => {
        pos += 1;
        continue;
      }
      0x01 | 0xD0..=0xD7 => {
        out.extend_from_slice(&data[pos..pos + 2]);
        pos += 2;
        continue;
      }
      // Start of scan or end of image: the rest is entropy-coded data.
      0xDA | 0xD9 => {
        if !inserted {
          out.extend_from_slice(&app1);
        }
        out.extend_from_slice(&data[pos..]);
        return Ok(out);
      }
      _ => {}
    }

    if pos + 4 > data.len() {
      return Err(malformed(format!("truncated segment at offset {}", pos)));
    }
    let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
    let end = pos + 2 + len;
    if len < 2 || end > data.len() {
      return Err(malformed(format!("bad segment length {} at offset {}", len, pos)));
    }

    let segment = &data[pos..end];
    let is_exif = marker == 0xE1 && segment[4..].starts_with(EXIF_HEADER);
    // JFIF requires APP0 to come first.
    if !inserted && marker != 0xE0 {
      out.extend_from_slice(&app1);
      inserted = true;
    }
    if !is_exif {
      out.extend_from_slice(segment);
    }
    pos = end;
  }
}

fn embed_png(data: &[u8], exif: &[u8]) -> Result<Vec<u8>, MetadataError> {
  let malformed = |msg: String| MetadataError::Malformed("PNG", msg);
  if u32::try_from(exif.len()).is_err() {
    return Err(MetadataError::TooLarge(exif.len()));
  }

  let mut out = Vec::with_capacity(data.len() + exif.len() + 12);
  out.extend_from_slice(&PNG_SIGNATURE);

  let mut inserted = false;
  let mut pos = PNG_SIGNATURE.len();
  while pos < data.len() {
    if pos + 12 > data.len() {
      return Err(malformed(format!("truncated chunk at offset {}", pos)));
    }
    let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
    let kind = &data[pos + 4..pos + 8];
    let end = pos
      .checked_add(12 + len)
      .filter(|end| *end <= data.len())
      .ok_or_else(|| malformed(format!("bad chunk length {} at offset {}", len, pos)))?;

    if kind == b"IDAT" && !inserted {
      write_png_chunk(&mut out, b"eXIf", exif);
      inserted = true;
    }
    if kind != b"eXIf" {
      out.extend_from_slice(&data[pos..end]);
    }
    pos = end;
  }

  if !inserted {
    return Err(malformed("no IDAT chunk".to_string()));
  }
  Ok(out)
}

fn write_png_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
  let mut crc = crc32fast::Hasher::new();
  crc.update(kind);
  crc.update(data);

  out.extend_from_slice(&(data.len() as u32).to_be_bytes());
  out.extend_from_slice(kind);
  out.extend_from_slice(data);
  out.extend_from_slice(&crc.finalize().to_be_bytes());
}

fn embed_webp(data: &[u8], exif: &[u8]) -> Result<Vec<u8>, MetadataError> {
  let malformed = |msg: String| MetadataError::Malformed("WebP", msg);
  if u32::try_from(exif.len()).is_err() {
    return Err(MetadataError::TooLarge(exif.len()));
  }

  let mut chunks: Vec<(&[u8], &[u8])> = Vec::new();
  let mut pos = 12;
  while pos + 8 <= data.len() {
    let fourcc = &data[pos..pos + 4];
    let len = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]]) as usize;
    let end = pos
      .checked_add(8 + len)
      .filter(|end| *end <= data.len())
      .ok_or_else(|| malformed(format!("bad chunk length {} at offset {}", len, pos)))?;
    chunks.push((fourcc, &data[pos + 8..end]));
    // Chunks are padded to an even size.
    pos = end + (len & 1);
  }
  if chunks.is_empty() {
    return Err(malformed("no chunks".to_string()));
  }

  let mut body = Vec::with_capacity(data.len() + exif.len() + 32);
  body.extend_from_slice(b"WEBP");

  // Simple (lossy or lossless only) files need a VP8X header to carry metadata.
  if chunks[0].0 != b"VP8X" {
    let (width, height, alpha) = webp_canvas(&chunks).ok_or_else(|| malformed("no VP8/VP8L frame".to_string()))?;
    let flags = VP8X_EXIF | if alpha { VP8X_ALPHA } else { 0 };
    let mut vp8x = vec![flags, 0, 0, 0];
    vp8x.extend_from_slice(&(width - 1).to_le_bytes()[..3]);
    vp8x.extend_from_slice(&(height - 1).to_le_bytes()[..3]);
    write_riff_chunk(&mut body, b"VP8X", &vp8x);
  }

  let mut inserted = false;
  for (fourcc, payload) in &chunks {
    match *fourcc {
      b"EXIF" => continue,
      b"VP8X" => {
        let mut vp8x = payload.to_vec();
        let flags = vp8x.first_mut().ok_or_else(|| malformed("empty VP8X chunk".to_string()))?;
        *flags |= VP8X_EXIF;
        write_riff_chunk(&mut body, fourcc, &vp8x);
        continue;
      }
      // EXIF precedes XMP.
      b"XMP " if !inserted => {
        write_riff_chunk(&mut body, b"EXIF", exif);
        inserted = true;
      }
      _ => {}
    }
    write_riff_chunk(&mut body, fourcc, payload);
  }
  if !inserted {
    write_riff_chunk(&mut body, b"EXIF", exif);
  }

  let riff_len = u32::try_from(body.len()).map_err(|_| MetadataError::TooLarge(exif.len()))?;
  let mut out = Vec::with_capacity(body.len() + 8);
  out.extend_from_slice(b"RIFF");
  out.extend_from_slice(&riff_len.to_le_bytes());
  out.extend_from_slice(&body);
  Ok(out)
}

/// Canvas size and alpha use of a simple WebP, read from its frame header.
fn webp_canvas(chunks: &[(&[u8], &[u8])]) -> Option<(u32, u32, bool)> {
  chunks.iter().find_map(|(fourcc, payload)| match *fourcc {
    b"VP8L" if payload.len() >= 5 && payload[0] == 0x2F => {
      let bits = u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]);
      Some(((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1, (bits >> 28) & 1 == 1))
    }
    b"VP8 " if payload.len() >= 10 && payload[3..6] == [0x9D, 0x01, 0x2A] => {
      let width = u16::from_le_bytes([payload[6], payload[7]]) & 0x3FFF;
      let height = u16::from_le_bytes([payload[8], payload[9]]) & 0x3FFF;
      Some((width as u32, height as u32, false))
    }
    _ => None,
  })
  .filter(|(w, h, _)| *w > 0 && *h > 0)
}

fn write_riff_chunk(out: &mut Vec<u8>, fourcc: &[u8], payload: &[u8]) {
  out.extend_from_slice(fourcc);
  out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
  out.extend_from_slice(payload);
  if payload.len() % 2 == 1 {
    out.push(0);
  }
}

/// Byte order helpers for a TIFF stream.
#[derive(Clone, Copy)]
struct TiffOrder {
  little_endian: bool,
}

impl TiffOrder {
  fn u16_at(self, data: &[u8], at: usize) -> Option<u16> {
    let b = data.get(at..at + 2)?;
    Some(if self.little_endian {
      u16::from_le_bytes([b[0], b[1]])
    } else {
      u16::from_be_bytes([b[0], b[1]])
    })
  }

  fn u32_at(self, data: &[u8], at: usize) -> Option<u32> {
    let b = data.get(at..at + 4)?;
    Some(if self.little_endian {
      u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    } else {
      u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    })
  }

  fn u16_bytes(self, v: u16) -> [u8; 2] {
    if self.little_endian {
      v.to_le_bytes()
    } else {
      v.to_be_bytes()
    }
  }

  fn u32_bytes(self, v: u32) -> [u8; 4] {
    if self.little_endian {
      v.to_le_bytes()
    } else {
      v.to_be_bytes()
    }
  }
}

/// Sets an ASCII field in the first IFD of a TIFF file.
///
/// The original bytes are kept in place, so every existing offset stays valid;
/// the value and a rebuilt IFD0 are appended and the header is pointed at it.
fn rewrite_tiff_field(data: &[u8], tag: Tag, value: &str) -> Result<Vec<u8>, MetadataError> {
  let malformed = |msg: &str| MetadataError::Malformed("TIFF", msg.to_string());
  let order = TiffOrder {
    little_endian: data.starts_with(b"II"),
  };
  if order.u16_at(data, 2) != Some(42) {
    return Err(malformed("not a classic TIFF header"));
  }

  let ifd0 = order.u32_at(data, 4).ok_or_else(|| malformed("truncated header"))? as usize;
  let count = order.u16_at(data, ifd0).ok_or_else(|| malformed("IFD0 out of range"))? as usize;
  let entries_start = ifd0 + 2;
  let entries_end = entries_start + 12 * count;
  let next_ifd = order
    .u32_at(data, entries_end)
    .ok_or_else(|| malformed("truncated IFD0"))?;

  let mut entries: Vec<Vec<u8>> = data[entries_start..entries_end]
    .chunks_exact(12)
    .filter(|entry| order.u16_at(entry, 0) != Some(tag.number()))
    .map(<[u8]>::to_vec)
    .collect();

  let mut out = data.to_vec();
  let mut text = value.as_bytes().to_vec();
  text.push(0);
  let text_len = u32::try_from(text.len()).map_err(|_| MetadataError::TooLarge(text.len()))?;

  let mut entry = Vec::with_capacity(12);
  entry.extend_from_slice(&order.u16_bytes(tag.number()));
  entry.extend_from_slice(&order.u16_bytes(TIFF_ASCII));
  entry.extend_from_slice(&order.u32_bytes(text_len));
  if text.len() <= 4 {
    text.resize(4, 0);
    entry.extend_from_slice(&text);
  } else {
    pad_to_word(&mut out);
    let offset = u32::try_from(out.len()).map_err(|_| MetadataError::TooLarge(out.len()))?;
    entry.extend_from_slice(&order.u32_bytes(offset));
    out.extend_from_slice(&text);
  }
  entries.push(entry);
  // Entries must be sorted by tag.
  entries.sort_by_key(|e| order.u16_at(e, 0).unwrap_or(u16::MAX));

  pad_to_word(&mut out);
  let new_ifd = u32::try_from(out.len()).map_err(|_| MetadataError::TooLarge(out.len()))?;
  out.extend_from_slice(&order.u16_bytes(entries.len() as u16));
  for entry in &entries {
    out.extend_from_slice(entry);
  }
  out.extend_from_slice(&order.u32_bytes(next_ifd));
  out[4..8].copy_from_slice(&order.u32_bytes(new_ifd));

  Ok(out)
}

fn pad_to_word(out: &mut Vec<u8>) {
  if out.len() % 2 == 1 {
    out.push(0);
  }
}

/// Sets one text field in an in-memory image and returns the new file contents.
pub fn rewrite_field(bytes: &[u8], name: &str, value: &str) -> Result<Vec<u8>, MetadataError> {
  if writable_container(bytes)? == Container::Tiff {
    return rewrite_tiff_field(bytes, text_tag(name)?, value);
  }
  let block = set_text_field(read_metadata(bytes)?, name, value)?;
  embed(bytes, &serialize(&block)?)
}

/// Stores `text` as the image description of the file at `path`, then reads
/// the file back to confirm the value landed.
pub async fn write_description(path: &Path, text: &str) -> Result<(), MetadataError> {
  let bytes = fs::read(path).await?;
  let updated = rewrite_field(&bytes, DESCRIPTION_FIELD, text)?;
  fs::write(path, &updated).await?;

  let found = read_description(&fs::read(path).await?)?;
  if found.as_deref() != Some(text) {
    return Err(MetadataError::VerificationFailed {
      field: DESCRIPTION_FIELD.to_string(),
      found,
    });
  }
  Ok(())
}

pub fn read_description(bytes: &[u8]) -> Result<Option<String>, MetadataError> {
  Ok(read_metadata(bytes)?.text_field(DESCRIPTION_FIELD))
}
