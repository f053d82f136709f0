//! Artifact name codec
//!
//! Creation time is carried inside the artifact name as
//! `<stem>_<unix seconds><.ext>`. There is no side index, so the sweep
//! recomputes liveness from the name alone. All knowledge of that format
//! lives in [`encode`] and [`decode_created_at`].

use std::path::Path;

/// Build an artifact name from the uploaded file name and a creation time
///
/// `photo.png` created at `1700000000` becomes `photo_1700000000.png`.
/// A name without an extension keeps none: `photo` becomes `photo_1700000000`.
pub fn encode(original_name: &str, created_at: i64) -> String {
    let (stem, ext) = split_extension(original_name);
    format!("{stem}_{created_at}{ext}")
}

/// Recover the creation timestamp embedded in an artifact name
///
/// Returns `None` when the name does not end in `_<digits>` before its
/// extension.
pub fn decode_created_at(name: &str) -> Option<i64> {
    let (stem, _) = split_extension(name);
    let (_, digits) = stem.rsplit_once('_')?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse().ok()
}

/// Extension of an artifact name without the leading dot, lowercased
pub fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Split `name` into stem and extension (extension keeps its leading dot)
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        // A leading dot is part of the stem, not an extension
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}
