use image::{io::Reader as ImageReader, ImageError};
use std::io::Cursor;

use crate::errors::{AppError, Result};

/// What the bytes turned out to be, independent of what the client claimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectedImage {
    pub mime_type: String,
    pub extension: String,
    pub dimensions: Option<(u32, u32)>,
}

pub fn validate_mime_type(mime_type: &str, allowed_types: &[String]) -> Result<()> {
    if !allowed_types.iter().any(|allowed| allowed == mime_type) {
        return Err(AppError::Validation(format!(
            "Unsupported file type {}",
            mime_type
        )));
    }
    Ok(())
}

pub fn get_file_extension(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/avif" => Some("avif"),
        "image/heif" => Some("heic"),
        _ => None,
    }
}

/// Sniffs the MIME type from magic bytes and checks it against the allow-list
/// and the dimension limit.
pub fn inspect_image(
    data: &[u8],
    allowed_types: &[String],
    max_dimension: u32,
) -> Result<InspectedImage> {
    if data.is_empty() {
        return Err(AppError::Validation("File is empty".to_string()));
    }

    let kind = infer::get(data)
        .ok_or_else(|| AppError::Validation("Could not determine file type".to_string()))?;
    let mime_type = kind.mime_type();
    validate_mime_type(mime_type, allowed_types)?;

    let dimensions = read_dimensions(data)?;
    if let Some((width, height)) = dimensions {
        if width > max_dimension || height > max_dimension {
            return Err(AppError::Validation(format!(
                "Image dimensions {}x{} exceed the {}px limit",
                width, height, max_dimension
            )));
        }
    }

    Ok(InspectedImage {
        mime_type: mime_type.to_string(),
        extension: get_file_extension(mime_type)
            .unwrap_or_else(|| kind.extension())
            .to_string(),
        dimensions,
    })
}

/// Header-only decode. Formats the decoder cannot read yield `None`.
fn read_dimensions(data: &[u8]) -> Result<Option<(u32, u32)>> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::Validation(format!("Invalid image data: {}", e)))?;

    match reader.into_dimensions() {
        Ok(dimensions) => Ok(Some(dimensions)),
        Err(ImageError::Unsupported(_)) => Ok(None),
        Err(e) => Err(AppError::Validation(format!("Invalid image data: {}", e))),
    }
}

/// Keeps only the final path segment of a client-supplied file name.
pub fn display_file_name(declared: &str) -> String {
    let name = declared
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() {
        "upload".to_string()
    } else {
        name.to_string()
    }
}
