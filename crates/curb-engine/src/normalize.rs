use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use curb_contracts::{GenerationError, GenerationErrorKind};
use image::{DynamicImage, ImageFormat};

/// Upload formats accepted from the front end.
pub const ACCEPTED_FORMATS: [ImageFormat; 2] = [ImageFormat::Png, ImageFormat::Jpeg];

/// An uploaded photo turned upright.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub image: DynamicImage,
    pub source_format: ImageFormat,
    pub orientation: Option<u32>,
    pub rotated: bool,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buffer, ImageFormat::Png)
            .context("failed encoding normalized image as PNG")?;
        Ok(buffer.into_inner())
    }

    /// The transport encoding the generation service expects for `init_image`.
    pub fn to_base64_png(&self) -> Result<String> {
        Ok(BASE64.encode(self.to_png_bytes()?))
    }

    pub fn save_preview(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.image
            .save(path)
            .with_context(|| format!("failed to save {}", path.display()))
    }
}

/// Decodes an upload and applies its EXIF orientation.
///
/// Orientation problems never fail the upload; only a missing or
/// undecodable image does.
pub fn normalize_upload(bytes: &[u8]) -> std::result::Result<NormalizedImage, GenerationError> {
    if bytes.is_empty() {
        return Err(GenerationError::no_image());
    }
    let source_format = image::guess_format(bytes).map_err(|err| {
        GenerationError::new(
            GenerationErrorKind::UnsupportedImage,
            format!("unrecognized image data: {err}"),
        )
    })?;
    if !ACCEPTED_FORMATS.contains(&source_format) {
        return Err(GenerationError::new(
            GenerationErrorKind::UnsupportedImage,
            format!("{source_format:?} uploads are not accepted; use PNG or JPEG"),
        ));
    }
    let decoded = image::load_from_memory_with_format(bytes, source_format).map_err(|err| {
        GenerationError::new(
            GenerationErrorKind::UnsupportedImage,
            format!("failed decoding {source_format:?} upload: {err}"),
        )
    })?;

    let orientation = read_orientation(bytes);
    let rotated = matches!(orientation, Some(3 | 6 | 8));
    if !rotated {
        tracing::debug!(?orientation, "no rotation to perform based on exif data");
    }
    let image = match orientation {
        Some(tag) => apply_orientation(decoded, tag),
        None => decoded,
    };

    Ok(NormalizedImage {
        image,
        source_format,
        orientation,
        rotated,
    })
}

/// EXIF orientation (tag 0x0112) of the primary image, if readable.
pub fn read_orientation(bytes: &[u8]) -> Option<u32> {
    let mut cursor = Cursor::new(bytes);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif,
        Err(err) => {
            tracing::debug!(%err, "exif metadata unavailable");
            return None;
        }
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
}

/// Rotates counter-clockwise by 180 (tag 3), 270 (tag 6) or 90 (tag 8)
/// degrees, growing the canvas to the rotated size. Other tags, mirrored
/// ones included, leave the image as it is.
pub fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        3 => image.rotate180(),
        6 => image.rotate90(),
        8 => image.rotate270(),
        _ => image,
    }
}
