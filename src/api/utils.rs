//! API utility functions
//!
//! Pure, stateless helpers for upload parsing and download headers, kept out
//! of services.rs so they can be unit tested.

use crate::api::error::ApiError;
use crate::transform::Dimensions;

/// Reduce a client-supplied file name to its final path component
///
/// Browsers may send a full path (`C:\photos\cat.png`); only `cat.png` is
/// kept. Returns `None` when nothing usable remains.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    Some(name.to_string())
}

/// Parse a positive dimension no larger than `max` from a form field
pub fn parse_dimension(field: &str, raw: &str, max: u32) -> Result<u32, ApiError> {
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 && value <= max => Ok(value),
        Ok(value) if value > max => Err(ApiError::InvalidPayload(format!(
            "{field} must be at most {max}, got {value}"
        ))),
        _ => Err(ApiError::InvalidPayload(format!(
            "{field} must be a positive integer, got '{raw}'"
        ))),
    }
}

/// Requested dimensions, falling back per axis to `default`
pub fn resolve_dimensions(default: Dimensions, width: Option<u32>, height: Option<u32>) -> Dimensions {
    Dimensions::new(
        width.unwrap_or(default.width),
        height.unwrap_or(default.height),
    )
}

/// `Content-Disposition` value offering `name` as a download
pub fn content_disposition(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("attachment; filename=\"{escaped}\"")
}
