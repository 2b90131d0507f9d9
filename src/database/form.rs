use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer};

use crate::constants::{TAG_COLOR_LEN, TAG_SLUG_MAX_LEN};
use crate::error::ApiError;
use crate::schema::Id;

/// Inline image field: accepts either a bare base64 string or a
/// `data:image/<ext>;base64,<payload>` URI and decodes it eagerly, so a
/// malformed image is rejected at deserialization time, before any write.
#[derive(Debug, Clone)]
pub struct ImageField {
    pub bytes: Vec<u8>,
    pub extension: String,
}

impl ImageField {
    pub fn from_base64(raw: &str) -> Result<Self, String> {
        let (extension, payload) = match raw.strip_prefix("data:image/") {
            Some(rest) => match rest.split_once(";base64,") {
                Some((ext, payload)) => (ext.to_string(), payload),
                None => return Err(String::from("Invalid image data URI")),
            },
            None => (String::from("png"), raw),
        };

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| format!("Invalid base64 image: {e}"))?;
        if bytes.is_empty() {
            return Err(String::from("Image must not be empty"));
        }

        Ok(Self { bytes, extension })
    }
}

impl<'de> Deserialize<'de> for ImageField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::from_base64(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientRef {
    pub id: Id,
    pub amount: i32,
}

/// Inbound recipe payload for both create and update. Scalar fields are
/// optional so updates can omit them; [`RecipePayload::validate_create`]
/// requires them all.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipePayload {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<ImageField>,
    #[serde(default)]
    pub tags: Vec<Id>,
    #[serde(default)]
    pub ingredients: Vec<IngredientRef>,
}

impl RecipePayload {
    /// Rules shared by create and update: tags and ingredients non-empty,
    /// amounts at least 1, ingredient references pairwise distinct, and
    /// cooking_time at least 1 whenever present.
    pub fn validate_refs(&self) -> Result<(), ApiError> {
        let mut errors: HashMap<String, String> = HashMap::new();

        if self.tags.is_empty() {
            errors.insert(
                String::from("tags"),
                String::from("At least one tag is required"),
            );
        }
        if self.ingredients.is_empty() {
            errors.insert(
                String::from("ingredients"),
                String::from("At least one ingredient is required"),
            );
        } else {
            if self.ingredients.iter().any(|i| i.amount < 1) {
                errors.insert(
                    String::from("amount"),
                    String::from("Amount must be at least 1"),
                );
            }
            let unique: HashSet<Id> = self.ingredients.iter().map(|i| i.id).collect();
            if unique.len() != self.ingredients.len() {
                errors.insert(
                    String::from("ingredients"),
                    String::from("Ingredients must be unique"),
                );
            }
        }
        if matches!(self.cooking_time, Some(t) if t < 1) {
            errors.insert(
                String::from("cooking_time"),
                String::from("Must be at least 1"),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }

    pub fn validate_create(&self) -> Result<(), ApiError> {
        let mut errors: HashMap<String, String> = HashMap::new();

        if self.name.as_deref().map_or(true, str::is_empty) {
            errors.insert(String::from("name"), String::from("This field is required"));
        }
        if self.text.as_deref().map_or(true, str::is_empty) {
            errors.insert(String::from("text"), String::from("This field is required"));
        }
        if self.cooking_time.is_none() {
            errors.insert(
                String::from("cooking_time"),
                String::from("This field is required"),
            );
        }
        if self.image.is_none() {
            errors.insert(
                String::from("image"),
                String::from("This field is required"),
            );
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        self.validate_refs()
    }

    pub fn validate_update(&self) -> Result<(), ApiError> {
        self.validate_refs()
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RegistrationPayload {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
}

impl RegistrationPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors: HashMap<String, String> = HashMap::new();

        if self.email.is_empty() || !self.email.contains('@') {
            errors.insert(
                String::from("email"),
                String::from("A valid email is required"),
            );
        }
        if self.username.is_empty() {
            errors.insert(
                String::from("username"),
                String::from("This field is required"),
            );
        }
        if self.password.len() < 8 {
            errors.insert(
                String::from("password"),
                String::from("Password must contain at least 8 characters"),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TagPayload {
    pub name: String,
    pub color: Option<String>,
    pub slug: String,
}

impl TagPayload {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors: HashMap<String, String> = HashMap::new();

        if self.name.is_empty() {
            errors.insert(String::from("name"), String::from("This field is required"));
        }
        if let Some(color) = &self.color {
            if !is_valid_tag_color(color) {
                errors.insert(
                    String::from("color"),
                    String::from("Enter a HEX color code"),
                );
            }
        }
        if self.slug.is_empty() || self.slug.len() > TAG_SLUG_MAX_LEN {
            errors.insert(
                String::from("slug"),
                format!("Slug must be 1-{TAG_SLUG_MAX_LEN} characters"),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

/// Matches `^#[0-9a-fA-F]{6}`.
pub fn is_valid_tag_color(color: &str) -> bool {
    color.len() == TAG_COLOR_LEN
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_payload() -> RecipePayload {
        RecipePayload {
            name: Some(String::from("Borscht")),
            text: Some(String::from("Chop and simmer.")),
            cooking_time: Some(90),
            image: Some(ImageField::from_base64("aGVsbG8=").unwrap()),
            tags: vec![1],
            ingredients: vec![IngredientRef { id: 1, amount: 5 }],
        }
    }

    fn field_of(err: ApiError) -> HashMap<String, String> {
        match err {
            ApiError::Validation(map) => map,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_complete_payload() {
        assert!(valid_payload().validate_create().is_ok());
    }

    #[test]
    fn rejects_empty_ingredient_list() {
        let mut payload = valid_payload();
        payload.ingredients.clear();
        let errors = field_of(payload.validate_create().unwrap_err());
        assert!(errors.contains_key("ingredients"));
    }

    #[test]
    fn rejects_empty_tag_list() {
        let mut payload = valid_payload();
        payload.tags.clear();
        let errors = field_of(payload.validate_create().unwrap_err());
        assert!(errors.contains_key("tags"));
    }

    #[test]
    fn rejects_duplicate_ingredient_refs() {
        let mut payload = valid_payload();
        payload.ingredients = vec![
            IngredientRef { id: 7, amount: 2 },
            IngredientRef { id: 7, amount: 3 },
        ];
        let errors = field_of(payload.validate_create().unwrap_err());
        assert!(errors.contains_key("ingredients"));
    }

    #[test]
    fn rejects_zero_cooking_time() {
        let mut payload = valid_payload();
        payload.cooking_time = Some(0);
        let errors = field_of(payload.validate_create().unwrap_err());
        assert!(errors.contains_key("cooking_time"));
    }

    #[test]
    fn rejects_non_positive_amount() {
        let mut payload = valid_payload();
        payload.ingredients[0].amount = 0;
        let errors = field_of(payload.validate_refs().unwrap_err());
        assert!(errors.contains_key("amount"));
    }

    #[test]
    fn missing_scalars_are_all_reported() {
        let payload = RecipePayload {
            tags: vec![1],
            ingredients: vec![IngredientRef { id: 1, amount: 1 }],
            ..Default::default()
        };
        let errors = field_of(payload.validate_create().unwrap_err());
        for field in ["name", "text", "cooking_time", "image"] {
            assert!(errors.contains_key(field), "missing key {field}");
        }
    }

    #[test]
    fn update_allows_absent_scalars() {
        let payload = RecipePayload {
            tags: vec![1],
            ingredients: vec![IngredientRef { id: 1, amount: 1 }],
            ..Default::default()
        };
        assert!(payload.validate_update().is_ok());
    }

    #[test]
    fn image_field_decodes_data_uri() {
        let image = ImageField::from_base64("data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(image.extension, "jpeg");
        assert_eq!(image.bytes, b"hello");
    }

    #[test]
    fn image_field_decodes_bare_base64() {
        let image = ImageField::from_base64("aGVsbG8=").unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(image.bytes, b"hello");
    }

    #[test]
    fn image_field_rejects_garbage() {
        assert!(ImageField::from_base64("not base64 at all!").is_err());
        assert!(ImageField::from_base64("data:image/png;base64,").is_err());
    }

    #[test]
    fn tag_color_pattern() {
        assert!(is_valid_tag_color("#a1B2c3"));
        assert!(!is_valid_tag_color("a1B2c3"));
        assert!(!is_valid_tag_color("#a1B2c"));
        assert!(!is_valid_tag_color("#a1B2cZ"));
        assert!(!is_valid_tag_color("#a1B2c3f"));
    }
}
