//! Image Pipeline Seam
//!
//! Thumbnail generation is an external concern. The catalog only needs two
//! handles back per uploaded image; how they are produced is up to the
//! implementation behind [`ImagePipeline`].
//!
//! Pipeline failures never fail a category write. `CategoryService` logs them
//! and leaves the thumbnail columns empty.

use crate::models::{category_thumbnail_handle, ThumbnailSet, THUMBNAIL_PREVIEW_SIZE, THUMBNAIL_SQUARE_SIZE};
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by an image pipeline
#[derive(Error, Debug)]
pub enum ImagePipelineError {
    #[error("Unsupported image: {0}")]
    Unsupported(String),

    #[error("Thumbnail generation failed for {image}: {reason}")]
    GenerationFailed { image: String, reason: String },

    #[error("Image storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ImagePipelineError {
    pub fn generation_failed(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::GenerationFailed {
            image: image.into(),
            reason: reason.into(),
        }
    }
}

/// Produces thumbnails for an uploaded category image
///
/// Called after the category row exists, because thumbnail locations are
/// keyed by the category id.
#[async_trait]
pub trait ImagePipeline: Send + Sync {
    async fn generate_thumbnails(
        &self,
        category_id: &str,
        image: &str,
    ) -> Result<ThumbnailSet, ImagePipelineError>;
}

/// Pipeline that only derives the conventional thumbnail handles
///
/// Useful when resizing happens out of process and writes to the standard
/// `categories/<id>/thumbs/` layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConventionalThumbnailHandles;

#[async_trait]
impl ImagePipeline for ConventionalThumbnailHandles {
    async fn generate_thumbnails(
        &self,
        category_id: &str,
        image: &str,
    ) -> Result<ThumbnailSet, ImagePipelineError> {
        if image.trim().is_empty() {
            return Err(ImagePipelineError::Unsupported(
                "empty image handle".to_string(),
            ));
        }
        Ok(ThumbnailSet {
            thumbnail_150: category_thumbnail_handle(category_id, image, THUMBNAIL_SQUARE_SIZE),
            thumbnail_800: category_thumbnail_handle(category_id, image, THUMBNAIL_PREVIEW_SIZE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_conventional_handles() {
        let set = ConventionalThumbnailHandles
            .generate_thumbnails("c1", "categories/uploads/shoes.png")
            .await
            .unwrap();
        assert_eq!(set.thumbnail_150, "categories/c1/thumbs/shoes_150x150.jpg");
        assert_eq!(set.thumbnail_800, "categories/c1/thumbs/shoes_800x800.jpg");
    }

    #[tokio::test]
    async fn test_blank_image_rejected() {
        let result = ConventionalThumbnailHandles
            .generate_thumbnails("c1", "  ")
            .await;
        assert!(matches!(result, Err(ImagePipelineError::Unsupported(_))));
    }
}
