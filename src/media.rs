use std::path::Path;

use crate::constants::MEDIA_RECIPE_DIR;
use crate::error::ApiError;
use crate::form::ImageField;
use crate::schema::Id;

/// Writes a recipe image under `{media_root}/recipes/{id}.{ext}` and returns
/// the media-relative path stored on the recipe row. Callers invoke this
/// inside the recipe write transaction, before commit, so an I/O failure
/// rolls the whole recipe back.
pub fn store_recipe_image(
    media_root: &Path,
    recipe_id: Id,
    image: &ImageField,
) -> Result<String, ApiError> {
    let relative = format!("{MEDIA_RECIPE_DIR}/{recipe_id}.{}", image.extension);
    let target = media_root.join(&relative);

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ApiError::Query(format!("Failed to create media directory: {e}")))?;
    }
    std::fs::write(&target, &image.bytes)
        .map_err(|e| ApiError::Query(format!("Failed to store image: {e}")))?;

    Ok(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_image_and_returns_relative_path() {
        let root = std::env::temp_dir().join("foodgram-media-test");
        let image = ImageField::from_base64("aGVsbG8=").unwrap();

        let relative = store_recipe_image(&root, 42, &image).unwrap();
        assert_eq!(relative, "recipes/42.png");
        assert_eq!(std::fs::read(root.join(&relative)).unwrap(), b"hello");

        std::fs::remove_dir_all(&root).ok();
    }
}
