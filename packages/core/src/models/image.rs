//! Image handles produced by the image pipeline
//!
//! Handles are opaque strings (storage-relative paths in the default media
//! layout). The core never decodes image bytes.

use serde::{Deserialize, Serialize};

/// Square thumbnail edge length in pixels
pub const THUMBNAIL_SQUARE_SIZE: u32 = 150;

/// Bounding box of the aspect-preserving preview thumbnail
pub const THUMBNAIL_PREVIEW_SIZE: u32 = 800;

/// Thumbnails generated for one uploaded image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailSet {
    #[serde(rename = "thumbnail150")]
    pub thumbnail_150: String,
    #[serde(rename = "thumbnail800")]
    pub thumbnail_800: String,
}

/// Directory (relative to the media root) holding all category images
pub const CATEGORY_MEDIA_DIR: &str = "categories";

/// Conventional storage-relative location for a category's thumbnails
///
/// `categories/<category_id>/thumbs/<stem>_<size>x<size>.jpg`
pub fn category_thumbnail_handle(category_id: &str, image: &str, size: u32) -> String {
    let file_name = image.rsplit('/').next().unwrap_or(image);
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    format!(
        "{}/{}/thumbs/{}_{}x{}.jpg",
        CATEGORY_MEDIA_DIR, category_id, stem, size, size
    )
}
